use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{PipelineError, PipelineResult};

/// Configuration for [`super::Pipeline`].
///
/// Loadable from JSON; missing keys keep their defaults:
///
/// ```rust
/// use item_pipeline::pipeline::PipelineOptions;
///
/// let opts = PipelineOptions::from_json_str(r#"{"close_when_idle": false, "idle_sleep_ms": 250}"#).unwrap();
/// assert!(!opts.close_when_idle);
/// assert_eq!(opts.idle_sleep.as_millis(), 250);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineOptions {
    /// Stop once the root producer is exhausted. When `false` the whole pipeline is restarted
    /// after [`PipelineOptions::idle_sleep`] (polling mode for unbounded sources).
    pub close_when_idle: bool,
    #[serde(rename = "idle_sleep_ms", deserialize_with = "millis")]
    pub idle_sleep: Duration,
    /// Upper bound on restarts in polling mode. `None` polls forever.
    pub max_restarts: Option<u64>,
    /// Fail on writes to unreachable paths instead of skipping them.
    pub strict_paths: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            close_when_idle: true,
            idle_sleep: Duration::from_secs(1),
            max_restarts: None,
            strict_paths: false,
        }
    }
}

impl PipelineOptions {
    pub fn from_json_str(json: &str) -> PipelineResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::config(format!("invalid pipeline options: {e}")))
    }

    /// Polling mode: restart when idle, sleeping `idle_sleep` in between.
    pub fn polling(idle_sleep: Duration) -> Self {
        Self {
            close_when_idle: false,
            idle_sleep,
            ..Self::default()
        }
    }
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}
