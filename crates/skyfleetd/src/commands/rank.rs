use colored::Colorize;
use skyfleet_catalog::Resolve;
use skyfleet_cloud::{ServiceType, TokenId};
use skyfleet_controlplane::ranking::{rank_candidates, resolve_snapshots};
use skyfleet_controlplane::MinimalCapabilities;

pub async fn handle(
    resolver: &dyn Resolve,
    identity: Option<&TokenId>,
    user_group: Option<&str>,
    service_types: &[ServiceType],
) -> anyhow::Result<()> {
    let Some(primary) = service_types.first() else {
        anyhow::bail!("at least one --service-type is required");
    };

    println!("{}", "Resolving provider preferences...".blue());
    let preferences = resolver.resolve_preferences(identity, user_group).await?;
    println!(
        "User group: {} ({})",
        preferences.user_group_name.cyan(),
        preferences.user_group_id.dimmed()
    );

    let snapshots = resolve_snapshots(resolver, &preferences, *primary, identity).await?;
    let ranked = rank_candidates(&preferences, &snapshots, service_types, &MinimalCapabilities)?;

    println!();
    println!(
        "{}",
        format!(
            "{:<4} {:<24} {:<36} {:<8} {:<50}",
            "#", "PROVIDER", "SERVICE", "SCORE", "ENDPOINT"
        )
        .bold()
    );
    println!("{}", "─".repeat(122).dimmed());
    for (rank, candidate) in ranked.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:<36} {:<8} {:<50}",
            rank + 1,
            candidate.provider_name,
            candidate.service.id,
            format!("{:.2}", candidate.score),
            candidate.service.endpoint
        );
        for companion in &candidate.companions {
            println!(
                "     {} {} {}",
                "↳".dimmed(),
                companion.service_type.to_string().dimmed(),
                companion.id.dimmed()
            );
        }
    }
    Ok(())
}
