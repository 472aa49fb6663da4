use colored::Colorize;
use skymap_cloud::Cloud;
use skymap_core::{ProfileRegistry, RenderedMap, RunOptions};
use skymap_engine::{deps, MapRunner};

pub async fn handle(
    cloud: Cloud,
    options: RunOptions,
    profiles: ProfileRegistry,
    rendered: RenderedMap,
) -> anyhow::Result<()> {
    let mut runner = MapRunner::new(cloud, options, profiles, rendered);
    let mut plan = runner.map_data().await?;
    deps::assign_levels(&mut plan)?;

    println!("{}", plan.summary().to_string().bold());
    println!();

    for entry in plan.create_by_level() {
        let requires = if entry.requires.is_empty() {
            String::new()
        } else {
            format!(" requires {}", entry.requires.join(", "))
        };
        println!(
            "  {} {} ({}, level {}{})",
            "+".green(),
            entry.name.green(),
            entry.provider,
            entry.level,
            requires
        );
    }
    for name in plan.existing.keys() {
        println!("  {} {} (already running)", "=".cyan(), name.cyan());
    }
    for (alias, driver, name) in &plan.destroy {
        println!("  {} {} ({alias}:{driver})", "-".red(), name.red());
    }
    for (profile, msg) in &plan.errors {
        println!("  {} profile {}: {msg}", "!".red().bold(), profile.red());
    }
    Ok(())
}
