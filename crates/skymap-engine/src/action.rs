//! Post-creation action dispatch
//!
//! After a parallel map run the caller may want a command (typically
//! `state.highstate`) run on the new minions. The runner batches the
//! targets by dependency level; how the command actually reaches the
//! minions is behind this trait.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Executes one action against a batch of freshly created minions,
/// returning a result payload per target name.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    async fn run(
        &self,
        targets: &[String],
        action: &str,
        timeout: Duration,
    ) -> Result<BTreeMap<String, serde_json::Value>>;
}
