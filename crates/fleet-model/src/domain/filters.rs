use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default refusal duration attached to every launch and decline.
pub const DEFAULT_REFUSE_SECONDS: f64 = 1.0;

/// Offer filters sent with a launch or decline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// How long the resource manager should wait before re-offering unused resources.
    pub refuse_seconds: f64,
}

impl Filters {
    pub fn refuse(seconds: f64) -> Self {
        Self {
            refuse_seconds: seconds,
        }
    }

    /// Negative or NaN means no refusal; values too large to represent saturate.
    pub fn refuse_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.refuse_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self::refuse(DEFAULT_REFUSE_SECONDS)
    }
}
