use chrono::{SecondsFormat, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Number of digest bytes kept in a file name (rendered as twice as many hex chars).
pub const DIGEST_BYTES: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NamingScheme {
    /// Digest of the entry name and the photo URL; stable across runs.
    #[default]
    UrlDigest,
    /// Digest of the entry name and the wall-clock time, shared by all slots of an entry.
    TimeSeeded,
}

/// Produces the file names for one entry's photo slots.
#[derive(Debug, Clone)]
pub struct SlotNamer {
    scheme: NamingScheme,
    name: String,
    seed: Option<String>,
}

impl SlotNamer {
    pub fn new(scheme: NamingScheme, name: &str) -> Self {
        let seed = match scheme {
            NamingScheme::UrlDigest => None,
            NamingScheme::TimeSeeded => {
                Some(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
        };
        Self {
            scheme,
            name: name.to_string(),
            seed,
        }
    }

    pub fn digest(&self, url: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        match (self.scheme, &self.seed) {
            (NamingScheme::TimeSeeded, Some(seed)) => hasher.update(seed.as_bytes()),
            _ => hasher.update(url.as_bytes()),
        };
        let hash = hasher.finalize();
        hex_prefix(hash.as_bytes())
    }

    /// `"<name> photo(<slot>)<digest>.jpg"`, `slot` being 1-based.
    pub fn file_name(&self, slot: usize, url: &str) -> String {
        format!("{} photo({slot}){}.jpg", self.name, self.digest(url))
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take(DIGEST_BYTES)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
