//! Document writers
//!
//! One model call per requested document type, all running concurrently. Each writer
//! sees the slice of the audit and the files relevant to its artifact. A writer that
//! exhausts its chain is reported as a failure and the remaining documents are kept.

use crate::context::{classify, pack_context, FileCategory};
use crate::llm::{CallMetadata, ModelCallExecutor, ModelChain, ModelExhaustionError, Prompt};
use crate::materializer::SourceFile;
use crate::output::{ProjectMap, TechnicalAudit};
use crate::pipeline::job::DocType;
use crate::source::CommitSummary;
use futures_util::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, warn};

pub struct WriterInput<'a> {
    pub audit: &'a TechnicalAudit,
    pub map: &'a ProjectMap,
    pub files: &'a [SourceFile],
    pub commits: &'a [CommitSummary],
    pub repo_name: &'a str,
    pub language: &'a str,
    pub budget: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDocument {
    pub doc_type: DocType,
    pub content: String,
    /// YAML spec extracted from the API reference
    pub spec: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterFailure {
    pub doc_type: DocType,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct WriterResults {
    pub documents: Vec<GeneratedDocument>,
    pub failures: Vec<WriterFailure>,
}

fn yaml_block_regex() -> &'static Regex {
    static YAML: OnceLock<Regex> = OnceLock::new();
    YAML.get_or_init(|| {
        Regex::new(r"```(?:yaml|yml)[ \t]*\r?\n([\s\S]*?)```").expect("yaml block pattern is valid")
    })
}

/// Splits the first fenced YAML block out of `text` when it parses. Anything else
/// keeps the full text as the body and no spec.
pub fn extract_yaml_spec(text: &str) -> (String, Option<String>) {
    let Some(captures) = yaml_block_regex().captures(text) else {
        return (text.to_string(), None);
    };
    let (Some(whole), Some(block)) = (captures.get(0), captures.get(1)) else {
        return (text.to_string(), None);
    };

    let spec = block.as_str().trim();
    match serde_yaml::from_str::<serde_yaml::Value>(spec) {
        Ok(value) if !value.is_null() => {}
        Ok(_) => return (text.to_string(), None),
        Err(e) => {
            debug!("Embedded YAML does not parse, keeping raw text: {}", e);
            return (text.to_string(), None);
        }
    }

    let mut body = String::with_capacity(text.len());
    body.push_str(text[..whole.start()].trim_end());
    let rest = text[whole.end()..].trim_start();
    if !body.is_empty() && !rest.is_empty() {
        body.push_str("\n\n");
    }
    body.push_str(rest);

    if body.trim().is_empty() {
        (text.to_string(), Some(spec.to_string()))
    } else {
        (body, Some(spec.to_string()))
    }
}

fn files_in(files: &[SourceFile], categories: &[FileCategory]) -> Vec<SourceFile> {
    files
        .iter()
        .filter(|f| categories.contains(&classify(&f.path)))
        .cloned()
        .collect()
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        "- none".to_string()
    } else {
        items
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn commit_log(commits: &[CommitSummary]) -> String {
    if commits.is_empty() {
        return "No commit history is available.".to_string();
    }
    commits
        .iter()
        .map(|c| {
            let subject = c.message.lines().next().unwrap_or_default();
            let sha: String = c.sha.chars().take(7).collect();
            match &c.date {
                Some(date) => format!("{} {} ({}, {})", sha, subject, c.author, date),
                None => format!("{} {} ({})", sha, subject, c.author),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn task(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Readme => "Write the project's README.md: what it is, features, stack, quick start and usage.",
        DocType::Api => "Write an API reference in Markdown. Include one fenced ```yaml block holding an OpenAPI 3 description of the endpoints you can identify.",
        DocType::Contributing => "Write CONTRIBUTING.md: local setup, build and test commands, conventions, and where new contributors should start.",
        DocType::Changelog => "Write CHANGELOG.md in Keep a Changelog format, grouping the commits below into Added, Changed and Fixed.",
        DocType::Architecture => "Write ARCHITECTURE.md: module overview, data flow, key design decisions and a mermaid diagram.",
    }
}

fn build_prompt(doc_type: DocType, input: &WriterInput<'_>) -> Prompt {
    let audit = input.audit;
    let stack = input.map.stack_line();

    let context = match doc_type {
        DocType::Readme => format!(
            "Summary:\n{}\n\nStack: {}\n\nOnboarding:\n{}\n\nFiles:\n{}",
            audit.executive_summary,
            stack,
            audit.onboarding_guide,
            pack_context(
                &files_in(input.files, &[FileCategory::Docs, FileCategory::Config]),
                input.budget
            )
        ),
        DocType::Api => {
            let mut api_files = files_in(input.files, &[FileCategory::Api]);
            if api_files.is_empty() {
                api_files = files_in(input.files, &[FileCategory::Source]);
            }
            format!(
                "API structure:\n{}\n\nFiles:\n{}",
                audit.sections.api_structure,
                pack_context(&api_files, input.budget)
            )
        }
        DocType::Contributing => format!(
            "Stack: {}\n\nOnboarding:\n{}\n\nKnown tech debt:\n{}\n\nConfiguration files:\n{}",
            stack,
            audit.onboarding_guide,
            bullet_list(&audit.sections.tech_debt),
            pack_context(&files_in(input.files, &[FileCategory::Config]), input.budget)
        ),
        DocType::Changelog => format!("Recent commits:\n{}", commit_log(input.commits)),
        DocType::Architecture => format!(
            "Overview:\n{}\n\nModules:\n{}\n\nDiagram:\n{}\n\nData flow:\n{}\n\nAPI structure:\n{}\n\nPerformance bottlenecks:\n{}",
            input.map.overview,
            bullet_list(
                &input
                    .map
                    .modules
                    .iter()
                    .map(|m| format!("{} ({}): {}", m.path, m.kind, m.responsibility))
                    .collect::<Vec<_>>()
            ),
            input.map.diagram,
            audit.sections.data_flow,
            audit.sections.api_structure,
            bullet_list(&audit.sections.performance_bottlenecks)
        ),
    };

    Prompt::new(
        format!(
            "You are a technical writer documenting the repository {}. Write in the language with code '{}'. Output Markdown only.",
            input.repo_name, input.language
        ),
        format!("{}\n\n{}", task(doc_type), context),
    )
}

fn stage_name(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Readme => "write_readme",
        DocType::Api => "write_api",
        DocType::Contributing => "write_contributing",
        DocType::Changelog => "write_changelog",
        DocType::Architecture => "write_architecture",
    }
}

/// Generates a single document
pub async fn write(
    executor: &ModelCallExecutor,
    chain: &ModelChain,
    doc_type: DocType,
    input: &WriterInput<'_>,
    analysis_id: &str,
) -> Result<GeneratedDocument, ModelExhaustionError> {
    let meta = CallMetadata::new(analysis_id, stage_name(doc_type)).with_temperature(0.4);
    let text = executor
        .call_text(chain, &build_prompt(doc_type, input), &meta)
        .await?;

    let (content, spec) = if doc_type == DocType::Api {
        extract_yaml_spec(&text)
    } else {
        (text, None)
    };

    Ok(GeneratedDocument {
        doc_type,
        content,
        spec,
    })
}

/// Runs every requested writer concurrently and joins all of them
pub async fn execute(
    executor: &ModelCallExecutor,
    chain: &ModelChain,
    doc_types: &[DocType],
    input: &WriterInput<'_>,
    analysis_id: &str,
) -> WriterResults {
    let outcomes = join_all(
        doc_types
            .iter()
            .map(|&doc_type| write(executor, chain, doc_type, input, analysis_id)),
    )
    .await;

    let mut results = WriterResults::default();
    for (doc_type, outcome) in doc_types.iter().zip(outcomes) {
        match outcome {
            Ok(document) => results.documents.push(document),
            Err(e) => {
                warn!(analysis_id, doc_type = %doc_type, "Document writer failed: {}", e);
                results.failures.push(WriterFailure {
                    doc_type: *doc_type,
                    error: e.to_string(),
                });
            }
        }
    }
    results
}
