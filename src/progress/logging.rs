//! Logging-based realtime channel

use super::{PublishError, RealtimeChannel};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Channel that logs published events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChannel;

#[async_trait]
impl RealtimeChannel for LoggingChannel {
    async fn publish(
        &self,
        channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PublishError> {
        let analysis_id = payload["analysisId"].as_str().unwrap_or_default();
        let progress = payload["progress"].as_u64().unwrap_or_default();
        let message = payload["message"].as_str().unwrap_or_default();

        match event {
            "analysis-failed" => {
                warn!(channel, analysis_id, progress, "Analysis failed: {}", message);
            }
            "analysis-complete" => {
                info!(channel, analysis_id, progress, "Analysis complete: {}", message);
            }
            _ => {
                debug!(channel, event, analysis_id, progress, "{}", message);
            }
        }
        Ok(())
    }
}
