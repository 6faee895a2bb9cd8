use crate::context::build_previews;
use crate::llm::{CallMetadata, ModelCallExecutor, ModelChain, ModelExhaustionError, Prompt};
use crate::materializer::SourceFile;
use crate::output::ProjectMap;
use tracing::debug;

const SYSTEM_PROMPT: &str = r#"You are a software architect producing a structural map of an unfamiliar codebase.
You only see the first lines of each file. Infer modules from directory layout, file names and imports.
Group files into modules by directory; do not list every file as its own module."#;

fn build_prompt(previews: &str, file_count: usize) -> Prompt {
    Prompt::new(
        SYSTEM_PROMPT,
        format!(
            r#"File previews ({} files, each truncated):

{}

Respond with JSON:
{{
  "overview": "what the project does, one paragraph",
  "stack": {{ "languages": ["..."], "frameworks": ["..."] }},
  "modules": [
    {{ "path": "src/api", "type": "service" | "library" | "cli" | "config" | "tests" | "docs", "responsibility": "...", "dependencies": ["src/db"] }}
  ],
  "diagram": "mermaid graph of module dependencies"
}}"#,
            file_count, previews
        ),
    )
}

/// Cheap first pass over file previews
pub async fn execute(
    executor: &ModelCallExecutor,
    chain: &ModelChain,
    files: &[SourceFile],
    preview_chars: usize,
    budget: usize,
    analysis_id: &str,
) -> Result<ProjectMap, ModelExhaustionError> {
    let previews = build_previews(files, preview_chars, budget);
    debug!(
        analysis_id,
        files = files.len(),
        chars = previews.chars().count(),
        "Built mapper previews"
    );

    let meta = CallMetadata::new(analysis_id, "map").with_temperature(0.1);
    executor
        .call_structured(chain, &build_prompt(&previews, files.len()), &meta)
        .await
}
