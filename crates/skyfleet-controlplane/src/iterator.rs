//! Forward-only cursor over ranked candidates

use skyfleet_cloud::{CandidateService, CloudError, Result};

/// Stateful cursor with fallback-on-failure semantics
///
/// Never empty, never rewinds. Once advanced past the last candidate it
/// keeps reporting exhaustion; retrying from the top needs a new ranking.
#[derive(Debug, Clone)]
pub struct CandidateIterator {
    candidates: Vec<CandidateService>,
    position: usize,
}

impl CandidateIterator {
    pub fn new(candidates: Vec<CandidateService>) -> Result<Self> {
        if candidates.is_empty() {
            return Err(CloudError::Selection(
                "cannot iterate over an empty candidate list".to_string(),
            ));
        }
        Ok(Self {
            candidates,
            position: 0,
        })
    }

    /// The active candidate
    pub fn current(&self) -> &CandidateService {
        &self.candidates[self.position]
    }

    /// Move to the next candidate
    pub fn advance(&mut self) -> Result<&CandidateService> {
        if self.position + 1 >= self.candidates.len() {
            return Err(CloudError::Exhausted(format!(
                "tried {} candidate(s), last was {}",
                self.candidates.len(),
                self.current()
            )));
        }
        self.position += 1;
        Ok(self.current())
    }

    /// Zero-based index of the active candidate
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.candidates.len() - self.position - 1
    }
}
