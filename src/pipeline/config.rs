use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Character budget of the Deep Analyzer code context
    pub analysis_budget: usize,
    /// Character budget of the Mapper preview block
    pub map_budget: usize,
    /// Prefix length of each Mapper preview
    pub preview_chars: usize,
    /// Character budget of each writer's file context
    pub writer_budget: usize,
    /// Instructions shorter than this skip the Sentinel
    pub sentinel_min_chars: usize,
    pub max_file_size: u64,
    /// Parent directory of snapshots; system temp when `None`
    pub workdir: Option<PathBuf>,
    /// Keep the project map inside `resultJson`
    pub retain_project_map: bool,
    /// Commits fed to the changelog writer
    pub changelog_commits: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_budget: 400_000,
            map_budget: 60_000,
            preview_chars: 600,
            writer_budget: 80_000,
            sentinel_min_chars: 10,
            max_file_size: 1024 * 1024,
            workdir: None,
            retain_project_map: false,
            changelog_commits: 30,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analysis_budget(mut self, budget: usize) -> Self {
        self.analysis_budget = budget;
        self
    }

    pub fn with_map_budget(mut self, budget: usize) -> Self {
        self.map_budget = budget;
        self
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub fn with_writer_budget(mut self, budget: usize) -> Self {
        self.writer_budget = budget;
        self
    }

    pub fn with_sentinel_min_chars(mut self, min_chars: usize) -> Self {
        self.sentinel_min_chars = min_chars;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn with_retain_project_map(mut self, retain: bool) -> Self {
        self.retain_project_map = retain;
        self
    }

    pub fn with_changelog_commits(mut self, commits: usize) -> Self {
        self.changelog_commits = commits;
        self
    }
}
