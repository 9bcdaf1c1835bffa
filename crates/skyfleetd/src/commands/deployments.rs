use colored::{ColoredString, Colorize};
use skyfleet_cloud::{Deployment, Status, TokenId};
use skyfleet_controlplane::{CleanupCoordinator, DeploymentService, RunHandle};

fn paint(status: Status) -> ColoredString {
    let label = status.to_string();
    if status.is_failed() {
        label.red()
    } else if status.is_in_progress() {
        label.yellow()
    } else {
        label.green()
    }
}

fn print_summary(deployment: &Deployment) {
    println!("{} {}", "Deployment:".bold(), deployment.id.cyan());
    println!("  Status:   {}", paint(deployment.status));
    if let Some(reason) = &deployment.status_reason {
        println!("  Reason:   {}", reason);
    }
    match &deployment.endpoint {
        Some(endpoint) => println!("  Endpoint: {}", endpoint),
        None => println!("  Endpoint: {}", "-".dimmed()),
    }
    if deployment.cancel_requested {
        println!("  {}", "Cancellation requested".yellow());
    }
}

async fn settle(run: RunHandle) -> anyhow::Result<()> {
    println!("{} {}", "Started run for".blue(), run.id().cyan());
    let deployment = run.wait().await?;
    print_summary(&deployment);
    if deployment.status.is_failed() {
        anyhow::bail!("deployment {} ended in {}", deployment.id, deployment.status);
    }
    Ok(())
}

pub async fn list(service: &DeploymentService) -> anyhow::Result<()> {
    let deployments = service.list().await?;
    if deployments.is_empty() {
        println!("{}", "No deployments".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<38} {:<20} {:<24} {:<20}",
            "ID", "STATUS", "PROVIDER", "CREATED"
        )
        .bold()
    );
    println!("{}", "─".repeat(102).dimmed());
    for deployment in deployments {
        let provider = deployment
            .endpoint
            .as_ref()
            .map(|e| e.provider_id.as_str())
            .unwrap_or("-");
        println!(
            "{:<38} {:<20} {:<24} {:<20}",
            deployment.id,
            paint(deployment.status),
            provider,
            deployment.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn show(service: &DeploymentService, id: &str, json: bool) -> anyhow::Result<()> {
    let deployment = service.get(id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&deployment)?);
        return Ok(());
    }

    print_summary(&deployment);
    println!("  Version:  {}", deployment.version);
    println!(
        "  Updated:  {}",
        deployment.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if !deployment.resources.is_empty() {
        println!("  Resources:");
        for resource in deployment.resources.values() {
            let state = if resource.deleted {
                "deleted".dimmed()
            } else {
                "live".green()
            };
            println!("    {} {} [{}]", resource.id, resource.resource_type, state);
        }
    }
    Ok(())
}

pub async fn reset(service: &DeploymentService, id: &str, status: Status) -> anyhow::Result<()> {
    let deployment = service.reset(id, status).await?;
    println!("{}", "✓ Status reset".green());
    print_summary(&deployment);
    Ok(())
}

pub async fn cancel(service: &DeploymentService, id: &str) -> anyhow::Result<()> {
    let deployment = service.cancel(id).await?;
    println!("{}", "✓ Cancellation requested".green());
    print_summary(&deployment);
    Ok(())
}

pub async fn resume(
    service: &DeploymentService,
    id: &str,
    identity: Option<TokenId>,
) -> anyhow::Result<()> {
    settle(service.resume(id, identity).await?).await
}

pub async fn delete(
    service: &DeploymentService,
    id: &str,
    force: bool,
    identity: Option<TokenId>,
) -> anyhow::Result<()> {
    if force {
        println!(
            "{}",
            "Force delete: resource cleanup is skipped and deprovisioning errors are ignored"
                .yellow()
        );
    }
    settle(service.delete(id, force, identity).await?).await
}

/// Tear down a deployment's resources without changing its status
pub async fn cleanup(
    service: &DeploymentService,
    coordinator: &CleanupCoordinator,
    id: &str,
    identity: Option<&TokenId>,
) -> anyhow::Result<()> {
    let deployment = service.get(id).await?;
    let report = coordinator.cleanup(&deployment, identity, false).await;

    for resource in &report.succeeded {
        println!("  {} {}", "✓".green(), resource);
    }
    for resource in &report.skipped {
        println!("  {} {} {}", "-".dimmed(), resource, "(no cleanup backend)".dimmed());
    }
    for (resource, reason) in &report.failed {
        println!("  {} {}: {}", "✗".red(), resource, reason);
    }
    println!("Finished in {} ms", report.duration_ms);

    if let Some(summary) = report.failure_summary() {
        anyhow::bail!("cleanup incomplete: {summary}");
    }
    Ok(())
}
