use skymap_cloud::{Cloud, CloudDriver, ProviderRegistry, StubDriver};
use skymap_core::{Profile, ProfileRegistry, ProviderTarget, RenderedMap, RunOptions};
use std::sync::Arc;
use tempfile::TempDir;

/// One fully wired test scenario: a stub provider, a profile registry,
/// a rendered map and a throwaway pki directory.
pub struct TestMap {
    pub pki: TempDir,
    pub stub: Arc<StubDriver>,
    pub profiles: ProfileRegistry,
    pub rendered: RenderedMap,
}

impl TestMap {
    pub fn new(stub: StubDriver) -> Self {
        Self {
            pki: tempfile::tempdir().unwrap(),
            stub: Arc::new(stub),
            profiles: ProfileRegistry::new(),
            rendered: RenderedMap::new(),
        }
    }

    pub fn with_profile(mut self, name: &str, provider: &str) -> Self {
        self.profiles.insert(
            name.to_string(),
            Profile {
                name: name.to_string(),
                provider: ProviderTarget::parse(provider).unwrap(),
                defaults: serde_json::Map::new(),
            },
        );
        self
    }

    pub fn with_instance(mut self, profile: &str, name: &str, overrides: serde_json::Value) -> Self {
        self.rendered
            .entry(profile.to_string())
            .or_default()
            .insert(
                name.to_string(),
                overrides.as_object().cloned().unwrap_or_default(),
            );
        self
    }

    /// Fresh fanout engine over the shared stub driver
    pub fn cloud(&self, alias: &str) -> Cloud {
        let mut registry = ProviderRegistry::new();
        registry.register_driver(Arc::clone(&self.stub) as Arc<dyn CloudDriver>);
        registry.add_provider(alias, self.stub.name(), serde_json::json!({}));
        Cloud::new(registry)
    }

    pub fn options(&self) -> RunOptions {
        let mut options = RunOptions::default();
        options.pki_dir = self.pki.path().to_path_buf();
        options
    }
}
