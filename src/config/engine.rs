//! Engine runtime configuration.

use super::defaults::default_mailbox_capacity;
use crate::platform::MemberId;
use serde::Deserialize;

/// Engine runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Member id of the bot itself. Voice transfers are driven by moving this
    /// member between channels.
    #[serde(default)]
    pub controller_id: MemberId,
    /// Queue actor mailbox capacity (default: 100).
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            controller_id: 0,
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}
