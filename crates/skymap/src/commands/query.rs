use anyhow::bail;
use skymap_cloud::{Cloud, QueryKind};
use skymap_pool::Interrupt;

pub async fn handle(mut cloud: Cloud, kind: Option<&str>) -> anyhow::Result<()> {
    let (kind, pinned) = match kind {
        None => (QueryKind::ListNodes, false),
        Some("full") => (QueryKind::ListNodesFull, true),
        Some("select") => (QueryKind::ListNodesSelect, true),
        Some("min") => (QueryKind::ListNodesMin, true),
        Some(other) => bail!("unknown query kind {other:?}, expected full, select or min"),
    };

    let inventory = cloud
        .map_providers_parallel(kind, pinned, false, &Interrupt::new())
        .await?;
    print!("{}", serde_yaml::to_string(&inventory.providers)?);
    Ok(())
}
