//! Snapshot of the application registry.

use crate::spec::ApplicationSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const APPLICATION_STATE_KIND: &str = "plinth.application_state.v1";
pub const APPLICATION_STATE_SCHEMA: u32 = 1;
const DIGEST_PREFIX: &str = "as1_";

/// Ordered specs plus a version marker and an integrity digest. Used for
/// both the registry file and user snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    pub schema: u32,
    pub state_kind: String,
    pub saved_at: DateTime<Utc>,
    pub digest: String,
    pub apps: Vec<ApplicationSpec>,
}

impl ApplicationState {
    pub fn new(apps: Vec<ApplicationSpec>) -> Self {
        Self {
            schema: APPLICATION_STATE_SCHEMA,
            state_kind: APPLICATION_STATE_KIND.to_string(),
            saved_at: Utc::now(),
            digest: digest_specs(&apps),
            apps,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.apps.iter().map(|a| a.name.as_str()).collect()
    }
}

/// Digest over the ordered specs; the timestamp is not covered.
pub fn digest_specs(apps: &[ApplicationSpec]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(apps).unwrap_or_default());
    let output = hasher.finalize();
    let mut rendered = String::with_capacity(DIGEST_PREFIX.len() + output.len() * 2);
    rendered.push_str(DIGEST_PREFIX);
    for byte in output {
        rendered.push_str(&format!("{byte:02x}"));
    }
    rendered
}
