//! Terminal progress bar for the CLI

use super::{PublishError, RealtimeChannel};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};

pub struct ProgressBarChannel {
    bar: ProgressBar,
}

impl ProgressBarChannel {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}% {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    /// Stops drawing; subsequent output goes to a clean line
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressBarChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeChannel for ProgressBarChannel {
    async fn publish(
        &self,
        _channel: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), PublishError> {
        if let Some(progress) = payload["progress"].as_u64() {
            self.bar.set_position(progress.min(100));
        }
        if let Some(message) = payload["message"].as_str() {
            self.bar.set_message(message.to_string());
        }
        if event != "analysis-progress" {
            self.bar.finish_with_message(payload["message"].as_str().unwrap_or_default().to_string());
        }
        Ok(())
    }
}
