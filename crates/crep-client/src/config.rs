use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Capacity of each subscription's output channel. A subscriber that
    /// falls this far behind applies backpressure to its watch task.
    pub subscription_buffer: usize,
    /// Maximum atoms per `repo/add_atoms` message in the reconnect resend
    /// sweep. `None` re-sends everything in one message.
    pub resend_batch_size: Option<usize>,
    /// Most atoms a `RemoteWeave` holds while waiting for their cause.
    /// Past this the oldest are abandoned.
    pub orphan_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            subscription_buffer: 64,
            resend_batch_size: None,
            orphan_limit: 1024,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ClientResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    fn validate(&self) -> ClientResult<()> {
        if self.subscription_buffer == 0 {
            return Err(ClientError::Config(
                "subscription_buffer must be at least 1".into(),
            ));
        }
        if self.resend_batch_size == Some(0) {
            return Err(ClientError::Config(
                "resend_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
