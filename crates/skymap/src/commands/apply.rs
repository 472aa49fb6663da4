use colored::Colorize;
use skymap_cloud::Cloud;
use skymap_core::{ProfileRegistry, RenderedMap, RunOptions};
use skymap_engine::MapRunner;

pub async fn handle(
    cloud: Cloud,
    options: RunOptions,
    profiles: ProfileRegistry,
    rendered: RenderedMap,
    yes: bool,
) -> anyhow::Result<()> {
    let mut runner = MapRunner::new(cloud, options, profiles, rendered);

    let interrupt = runner.interrupt();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.raise();
        }
    });

    let plan = runner.map_data().await?;
    let summary = plan.summary();
    println!("{}", summary.to_string().bold());

    if summary.create == 0 && summary.destroy == 0 {
        println!("{}", "Nothing to do.".green());
        return Ok(());
    }
    if !yes && !super::confirm("Proceed?")? {
        println!("Aborted.");
        return Ok(());
    }

    let output = runner.run_map(plan).await?;
    for (name, result) in &output {
        if result.get("Error").is_some() {
            println!("  {} {}: {}", "✗".red(), name.red(), result["Error"]);
        } else if result.get("Message").is_some() {
            println!("  {} {}: {}", "=".cyan(), name.cyan(), result["Message"]);
        } else {
            println!("  {} {}", "✓".green(), name.green());
        }
    }
    println!("{}", serde_yaml::to_string(&output)?);
    Ok(())
}
