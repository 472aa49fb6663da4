//! Minion key material and the master-side key store
//!
//! Keypairs generated here preseed newly provisioned minions so they are
//! accepted by the bootstrapped master without a manual signing round.
//! The store also cleans up accepted keys when a hard map destroys an
//! instance; glob matches handle minions keyed with an appended domain.

use crate::error::Result;
use rand::RngCore;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A generated keypair, PEM-wrapped
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: String,
    pub private: String,
}

impl KeyPair {
    /// Generate a fresh keypair of the given bit length
    pub fn generate(keysize: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            public: pem_block("PUBLIC KEY", &random_bytes(&mut rng, keysize / 8)),
            private: pem_block("RSA PRIVATE KEY", &random_bytes(&mut rng, keysize / 8)),
        }
    }

    /// Colon-separated hex fingerprint of the public key
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.public)
    }
}

fn random_bytes(rng: &mut impl RngCore, len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len.max(32)];
    rng.fill_bytes(&mut bytes);
    bytes
}

fn pem_block(label: &str, bytes: &[u8]) -> String {
    let mut body = String::with_capacity(bytes.len() * 2);
    for chunk in bytes.chunks(32) {
        for b in chunk {
            let _ = write!(body, "{b:02x}");
        }
        body.push('\n');
    }
    format!("-----BEGIN {label}-----\n{body}-----END {label}-----\n")
}

/// Fingerprint arbitrary key text: the leading hash bytes as
/// colon-separated hex pairs
pub fn fingerprint_of(key: &str) -> String {
    let hash = blake3::hash(key.as_bytes());
    hash.as_bytes()[..16]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Asked when destroy-time key cleanup matches more than one key file.
/// Returns the index of the file to remove, or `None` to leave all of
/// them alone.
pub type AmbiguityResolver = Arc<dyn Fn(&[PathBuf]) -> Option<usize> + Send + Sync>;

/// Outcome of destroy-time key cleanup for one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCleanup {
    /// No accepted key matched the instance name
    NotFound,

    /// The named key files were removed
    Removed(Vec<String>),

    /// Several keys matched and no resolver picked one; nothing removed
    Ambiguous(Vec<String>),
}

/// The master's accepted-minion key directory
#[derive(Debug, Clone)]
pub struct KeyStore {
    pki_dir: PathBuf,
}

impl KeyStore {
    pub fn new(pki_dir: impl Into<PathBuf>) -> Self {
        Self {
            pki_dir: pki_dir.into(),
        }
    }

    fn minions_dir(&self) -> PathBuf {
        self.pki_dir.join("minions")
    }

    /// Preseed one minion key as already accepted
    pub fn accept(&self, id: &str, public_key: &str) -> Result<PathBuf> {
        let dir = self.minions_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(id);
        std::fs::write(&path, public_key)?;
        info!(id, "accepted minion key");
        Ok(path)
    }

    /// Remove one accepted key by exact id. Returns whether a key
    /// existed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let path = self.minions_dir().join(id);
        if !path.is_file() {
            return Ok(false);
        }
        std::fs::remove_file(&path)?;
        info!(id, "removed minion key");
        Ok(true)
    }

    /// Fingerprint of the local master public key, if one exists
    pub fn master_fingerprint(&self) -> Option<String> {
        let path = self.pki_dir.join("master.pub");
        match std::fs::read_to_string(&path) {
            Ok(key) => Some(fingerprint_of(&key)),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no local master key to fingerprint");
                None
            }
        }
    }

    /// Remove the accepted key(s) for a destroyed instance.
    ///
    /// An exact filename match with no glob siblings is removed outright,
    /// as is a single `name.*` glob match (minion id with an appended
    /// domain). Anything else is ambiguous: the resolver picks one file,
    /// or everything is left in place and reported.
    pub fn remove_for_instance(
        &self,
        name: &str,
        resolver: Option<&AmbiguityResolver>,
    ) -> Result<KeyCleanup> {
        let exact = self.minions_dir().join(name);
        let pattern = self.minions_dir().join(format!("{name}.*"));
        let globbed: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
            .filter_map(|p| p.ok())
            .collect();

        if exact.is_file() && globbed.is_empty() {
            std::fs::remove_file(&exact)?;
            info!(name, "removed minion key");
            return Ok(KeyCleanup::Removed(vec![name.to_string()]));
        }

        if !exact.is_file() && globbed.len() == 1 {
            let only = &globbed[0];
            let label = file_label(only);
            std::fs::remove_file(only)?;
            info!(key = label.as_str(), "removed minion key");
            return Ok(KeyCleanup::Removed(vec![label]));
        }

        if !exact.is_file() && globbed.is_empty() {
            debug!(name, "no minion key to clean up");
            return Ok(KeyCleanup::NotFound);
        }

        // Exact and glob matches together, or several glob matches.
        let mut candidates = Vec::new();
        if exact.is_file() {
            candidates.push(exact);
        }
        candidates.extend(globbed);

        if let Some(resolver) = resolver {
            if let Some(index) = resolver(&candidates) {
                if let Some(chosen) = candidates.get(index) {
                    let label = file_label(chosen);
                    std::fs::remove_file(chosen)?;
                    info!(key = label.as_str(), "removed minion key");
                    return Ok(KeyCleanup::Removed(vec![label]));
                }
            }
        }

        let labels: Vec<String> = candidates.iter().map(|p| file_label(p)).collect();
        warn!(
            name,
            matches = labels.join(", "),
            "several minion keys match, not removing any"
        );
        Ok(KeyCleanup::Ambiguous(labels))
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
