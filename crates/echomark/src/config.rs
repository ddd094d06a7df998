//! Orchestrator configuration.

use std::time::Duration;

use echomark_protocol::CodecConfig;
use echomark_session::SessionLimits;
use echomark_verify::VerifierConfig;
use serde::{Deserialize, Serialize};

/// Everything an orchestrator needs besides its ledger and clock.
///
/// Every field has a default, so a JSON file only needs the values it
/// changes:
///
/// ```json
/// { "limits": { "reissue_interval": { "secs": 5, "nanos": 0 } }, "frame_buffer": 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub codec: CodecConfig,
    pub limits: SessionLimits,
    pub verifier: VerifierConfig,
    /// Audio frames buffered per session before new ones are dropped.
    pub frame_buffer: usize,
    /// Random delay added to each session's first re-issue.
    pub initial_jitter: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            codec: CodecConfig::default(),
            limits: SessionLimits::default(),
            verifier: VerifierConfig::default(),
            frame_buffer: 16,
            initial_jitter: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: OrchestratorConfig = serde_json::from_str(r#"{ "frame_buffer": 4 }"#).unwrap();
        assert_eq!(config.frame_buffer, 4);
        assert_eq!(config.limits, SessionLimits::default());
        assert_eq!(config.codec.sample_rate, 48_000);
    }
}
