//! Metrics & Scoring Engine
//!
//! Static code metrics, contributor concentration and audit-derived counts, folded
//! into five deterministic 0-100 scores.

use crate::context::{classify, language_for, FileCategory};
use crate::materializer::SourceFile;
use crate::output::{Priority, TechnicalAudit};
use crate::source::Contributor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

const LONG_LINE_CHARS: usize = 120;
const LARGEST_FILES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSize {
    pub path: String,
    pub lines: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetrics {
    pub files: usize,
    pub total_lines: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    /// Lines per language
    pub languages: BTreeMap<String, usize>,
    pub largest_files: Vec<FileSize>,
    pub todo_count: usize,
    pub long_lines: usize,
    pub test_files: usize,
    pub doc_files: usize,
    pub has_readme: bool,
}

impl CodeMetrics {
    pub fn avg_lines_per_file(&self) -> f64 {
        if self.files == 0 {
            0.0
        } else {
            self.total_lines as f64 / self.files as f64
        }
    }

    /// Comment lines over non-blank lines
    pub fn comment_ratio(&self) -> f64 {
        let non_blank = self.code_lines + self.comment_lines;
        if non_blank == 0 {
            0.0
        } else {
            self.comment_lines as f64 / non_blank as f64
        }
    }
}

fn comment_prefixes(language: Option<&str>) -> &'static [&'static str] {
    match language {
        Some(
            "Rust" | "JavaScript" | "TypeScript" | "Go" | "Java" | "Kotlin" | "C#" | "C" | "C++"
            | "Swift" | "Scala" | "Dart" | "PHP" | "CSS" | "Vue" | "Svelte",
        ) => &["//", "/*", "*", "*/"],
        Some("Python" | "Ruby" | "Shell" | "Elixir") => &["#"],
        Some("SQL" | "Lua") => &["--"],
        Some("HTML") => &["<!--"],
        _ => &[],
    }
}

pub fn code_metrics(files: &[SourceFile]) -> CodeMetrics {
    let mut metrics = CodeMetrics {
        files: files.len(),
        ..Default::default()
    };
    let mut sizes = Vec::with_capacity(files.len());

    for file in files {
        let path = Path::new(&file.path);
        let language = language_for(path);
        let prefixes = comment_prefixes(language);

        match classify(&file.path) {
            FileCategory::Test => metrics.test_files += 1,
            FileCategory::Docs => metrics.doc_files += 1,
            _ => {}
        }
        if path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase().starts_with("readme"))
            .unwrap_or(false)
        {
            metrics.has_readme = true;
        }

        let mut lines = 0;
        for line in file.content.lines() {
            lines += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                metrics.blank_lines += 1;
            } else if prefixes.iter().any(|p| trimmed.starts_with(p)) {
                metrics.comment_lines += 1;
            } else {
                metrics.code_lines += 1;
            }
            if line.contains("TODO") || line.contains("FIXME") {
                metrics.todo_count += 1;
            }
            if line.chars().count() > LONG_LINE_CHARS {
                metrics.long_lines += 1;
            }
        }

        metrics.total_lines += lines;
        if let Some(language) = language {
            *metrics.languages.entry(language.to_string()).or_default() += lines;
        }
        sizes.push(FileSize {
            path: file.path.clone(),
            lines,
        });
    }

    sizes.sort_by(|a, b| b.lines.cmp(&a.lines).then_with(|| a.path.cmp(&b.path)));
    sizes.truncate(LARGEST_FILES);
    metrics.largest_files = sizes;
    metrics
}

/// Number of top contributors whose cumulative commits reach half of all commits
pub fn bus_factor(contributors: &[Contributor]) -> u32 {
    let total: u64 = contributors.iter().map(|c| c.commits).sum();
    if total == 0 {
        return 0;
    }

    let mut commits: Vec<u64> = contributors.iter().map(|c| c.commits).collect();
    commits.sort_unstable_by(|a, b| b.cmp(a));

    let mut cumulative = 0;
    for (i, count) in commits.iter().enumerate() {
        cumulative += count;
        if cumulative * 2 >= total {
            return (i + 1) as u32;
        }
    }
    commits.len() as u32
}

/// Counts derived from the structured audit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditCounts {
    pub security_score: u8,
    pub security_risks: usize,
    pub tech_debt_items: usize,
    pub performance_bottlenecks: usize,
    pub refactor_targets: usize,
    pub high_priority_refactors: usize,
    pub has_onboarding_guide: bool,
}

impl AuditCounts {
    pub fn from_audit(audit: &TechnicalAudit) -> Self {
        Self {
            security_score: audit.sections.security.score,
            security_risks: audit.sections.security.risks.len(),
            tech_debt_items: audit.sections.tech_debt.len(),
            performance_bottlenecks: audit.sections.performance_bottlenecks.len(),
            refactor_targets: audit.refactor_targets.len(),
            high_priority_refactors: audit
                .refactor_targets
                .iter()
                .filter(|t| t.priority == Priority::High)
                .count(),
            has_onboarding_guide: !audit.onboarding_guide.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub health: u8,
    pub security: u8,
    pub complexity: u8,
    pub onboarding: u8,
    pub tech_debt: u8,
}

impl fmt::Display for Scores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "health {} | security {} | complexity {} | onboarding {} | tech debt {}",
            self.health, self.security, self.complexity, self.onboarding, self.tech_debt
        )
    }
}

/// Everything stored as `metricsJson`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub code: CodeMetrics,
    pub bus_factor: u32,
    pub contributors: usize,
    pub audit: AuditCounts,
}

fn clamp_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

pub fn compute_scores(code: &CodeMetrics, bus_factor: u32, audit: &AuditCounts) -> Scores {
    let security = audit.security_score as f64 * 10.0 - 3.0 * audit.security_risks as f64;

    let complexity = 100.0
        - (code.avg_lines_per_file() / 10.0).min(40.0)
        - (5.0 * audit.performance_bottlenecks as f64).min(30.0)
        - (10.0 * audit.high_priority_refactors as f64).min(30.0);

    let tech_debt = 100.0
        - 8.0 * audit.tech_debt_items as f64
        - (code.todo_count as f64 / 2.0).min(30.0);

    let onboarding = 40.0
        + if code.has_readme { 15.0 } else { 0.0 }
        + (code.comment_ratio() * 100.0).min(20.0)
        + if bus_factor > 1 { 10.0 } else { 0.0 }
        + if audit.has_onboarding_guide { 15.0 } else { 0.0 };

    let security = clamp_score(security);
    let complexity = clamp_score(complexity);
    let tech_debt = clamp_score(tech_debt);
    let onboarding = clamp_score(onboarding);
    let bus = (20.0 * bus_factor as f64).min(100.0);

    let health = 0.3 * security as f64
        + 0.2 * complexity as f64
        + 0.25 * tech_debt as f64
        + 0.15 * onboarding as f64
        + 0.1 * bus;

    Scores {
        health: clamp_score(health),
        security,
        complexity,
        onboarding,
        tech_debt,
    }
}
