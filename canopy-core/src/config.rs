//! Runtime Configuration
//!
//! [`RuntimeConfig`] controls how a [`Runtime`](crate::Runtime) schedules
//! effects and reports stale targets. Every field has a default, so a
//! partial JSON document is a valid configuration.

use serde::{Deserialize, Serialize};

/// How concurrent effect invocations on one container are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMode {
    /// Invocations run independently and apply their patches in the order
    /// they resolve. Overlapping keys are last-write-wins.
    #[default]
    Concurrent,

    /// Externally dispatched invocations on a container run one at a time,
    /// in arrival order. Calls made from inside an effect bypass the queue.
    Serialized,
}

/// Configuration shared by every container a runtime attaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Effect scheduling mode.
    pub effect_mode: EffectMode,

    /// Log dropped patches and calls on detached containers at `warn`
    /// level. When false they are logged at `debug`.
    pub warn_on_stale: bool,

    /// Invalidate and notify descendant containers when an ancestor's
    /// state changes under a key they do not shadow.
    pub notify_descendants: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            effect_mode: EffectMode::Concurrent,
            warn_on_stale: true,
            notify_descendants: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn effect_mode(mut self, mode: EffectMode) -> Self {
        self.effect_mode = mode;
        self
    }

    pub fn warn_on_stale(mut self, warn: bool) -> Self {
        self.warn_on_stale = warn;
        self
    }

    pub fn notify_descendants(mut self, notify: bool) -> Self {
        self.notify_descendants = notify;
        self
    }
}
