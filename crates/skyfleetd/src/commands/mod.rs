pub mod deployments;
pub mod rank;
