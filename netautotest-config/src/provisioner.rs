//! Network provisioner selection.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Back-end that brings the network up and down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisionerBackend {
    /// Local responders on 127.0.0.0/8, for dry runs.
    Loopback,
    /// External commands. `up` prints the endpoint list as JSON; `down`
    /// receives the handle id as its last argument.
    Command { up: Vec<String>, down: Vec<String> },
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ProvisionerConfig {
    #[validate(custom(function = validation::validate_backend))]
    #[serde(default = "default_backend")]
    pub backend: ProvisionerBackend,

    /// Wait after provisioning before the first probe (seconds).
    #[validate(range(max = 600))]
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
}

fn default_backend() -> ProvisionerBackend {
    ProvisionerBackend::Loopback
}
fn default_settle() -> u64 {
    3
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            settle_secs: default_settle(),
        }
    }
}
