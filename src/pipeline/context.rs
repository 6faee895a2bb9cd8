//! Pipeline context for managing dependencies

use std::sync::Arc;
use std::time::Duration;

use crate::fs::{FileSystem, RealFileSystem};
use crate::llm::{ModelCallExecutor, ModelChain};
use crate::progress::RealtimeChannel;
use crate::source::SourceHost;
use crate::store::Store;

use super::config::PipelineConfig;

/// Fallback chains per model tier
#[derive(Debug, Clone, Default)]
pub struct ModelTiers {
    /// Sentinel and Mapper
    pub fast: ModelChain,
    /// Deep Analyzer: powerful, then architect, then fallback
    pub analysis: ModelChain,
    /// Document writers
    pub writer: ModelChain,
}

impl ModelTiers {
    pub fn new(fast: ModelChain, analysis: ModelChain, writer: ModelChain) -> Self {
        Self {
            fast,
            analysis,
            writer,
        }
    }

    /// Same chain for every tier
    pub fn uniform(chain: ModelChain) -> Self {
        Self {
            fast: chain.clone(),
            analysis: chain.clone(),
            writer: chain,
        }
    }
}

/// Context that owns all long-lived pipeline dependencies
pub struct PipelineContext {
    /// Persistence collaborator
    pub store: Arc<dyn Store>,

    /// Source-hosting collaborator
    pub source: Arc<dyn SourceHost>,

    /// Realtime channel for progress events
    pub channel: Arc<dyn RealtimeChannel>,

    /// File system abstraction
    pub file_system: Arc<dyn FileSystem>,

    pub executor: Arc<ModelCallExecutor>,

    pub models: ModelTiers,

    /// Pipeline configuration
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Create a new pipeline context
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn SourceHost>,
        channel: Arc<dyn RealtimeChannel>,
        models: ModelTiers,
    ) -> Self {
        Self {
            store,
            source,
            channel,
            file_system: Arc::new(RealFileSystem),
            executor: Arc::new(ModelCallExecutor::new(Duration::from_secs(120))),
            models,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_file_system(mut self, file_system: Arc<dyn FileSystem>) -> Self {
        self.file_system = file_system;
        self
    }

    pub fn with_executor(mut self, executor: Arc<ModelCallExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLLMClient, ModelProvider};
    use crate::progress::NoOpChannel;
    use crate::source::GithubSource;
    use crate::store::MemoryStore;

    #[test]
    fn test_context_creation() {
        let chain = ModelChain::single(ModelProvider::new(Arc::new(MockLLMClient::with_name("m"))));
        let source = GithubSource::new("http://localhost:1", Duration::from_secs(1)).unwrap();

        let context = PipelineContext::new(
            Arc::new(MemoryStore::new()),
            Arc::new(source),
            Arc::new(NoOpChannel),
            ModelTiers::uniform(chain),
        )
        .with_config(PipelineConfig::new().with_map_budget(1_000));

        assert_eq!(context.models.fast.ids(), vec!["m"]);
        assert_eq!(context.models.writer.len(), 1);
        assert_eq!(context.config.map_budget, 1_000);
    }
}
