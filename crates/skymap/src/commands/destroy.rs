use colored::Colorize;
use skymap_cloud::Cloud;
use skymap_core::{ProfileRegistry, RenderedMap, RunOptions};
use skymap_engine::MapRunner;

pub async fn handle(
    cloud: Cloud,
    options: RunOptions,
    names: Vec<String>,
    yes: bool,
) -> anyhow::Result<()> {
    let question = format!("Destroy {}?", names.join(", "));
    if !yes && !super::confirm(&question)? {
        println!("Aborted.");
        return Ok(());
    }

    let mut runner = MapRunner::new(cloud, options, ProfileRegistry::new(), RenderedMap::new());

    let interrupt = runner.interrupt();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.raise();
        }
    });

    let output = runner.destroy(&names).await?;
    for (name, result) in &output {
        if result.get("Error").is_some() {
            println!("  {} {}: {}", "✗".red(), name.red(), result["Error"]);
        } else {
            println!("  {} {} destroyed", "✓".green(), name.green());
        }
    }
    Ok(())
}
