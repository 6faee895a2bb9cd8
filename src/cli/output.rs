//! Output formatting for stored analyses
//!
//! JSON is the machine-readable form of the job row plus its documents; the human
//! format is a compact terminal report.

use anyhow::{Context, Result};
use serde_json::json;

use crate::metrics::Scores;
use crate::pipeline::{AnalysisJob, JobStatus};
use crate::store::Document;

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a job together with the documents generated at its commit
    pub fn format_job(&self, job: &AnalysisJob, documents: &[Document]) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_json(job, documents),
            OutputFormat::Human => Ok(self.format_human(job, documents)),
        }
    }

    fn format_json(&self, job: &AnalysisJob, documents: &[Document]) -> Result<String> {
        serde_json::to_string_pretty(&json!({
            "analysis": job,
            "documents": documents,
        }))
        .context("Failed to serialize analysis to JSON")
    }

    fn format_human(&self, job: &AnalysisJob, documents: &[Document]) -> String {
        let mut output = String::new();

        let symbol = match job.status {
            JobStatus::Done => "\u{2713}",
            JobStatus::Failed => "\u{2717}",
            _ => "\u{2026}",
        };
        output.push_str(&format!("{} Analysis {}\n", symbol, job.id));
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Status:    {} ({}%)\n", job.status, job.progress));
        output.push_str(&format!("Message:   {}\n", job.message));
        if let Some(ref sha) = job.commit_sha {
            output.push_str(&format!("Commit:    {}\n", sha));
        }
        if let Some(ref error) = job.error {
            output.push_str(&format!("Error:     {}\n", error));
        }
        if job
            .result_json
            .as_ref()
            .and_then(|r| r["skipped"].as_bool())
            .unwrap_or(false)
        {
            output.push_str("Reused:    results copied from an earlier analysis\n");
        }
        output.push('\n');

        if let Some(ref scores) = job.scores {
            output.push_str("Scores:\n");
            output.push_str(&score_lines(scores));
            output.push('\n');
        }

        if !documents.is_empty() {
            output.push_str("Documents:\n");
            for (i, doc) in documents.iter().enumerate() {
                let connector = if i == documents.len() - 1 { "\u{2514}" } else { "\u{251C}" };
                let spec = if doc.spec.is_some() { " + spec" } else { "" };
                output.push_str(&format!(
                    "{}\u{2500} {} @ {} ({} chars{})\n",
                    connector,
                    doc.doc_type.file_name(),
                    doc.version,
                    doc.content.chars().count(),
                    spec
                ));
            }
            output.push('\n');
        }

        if !job.logs.is_empty() {
            output.push_str("Log:\n");
            for line in &job.logs {
                output.push_str(&format!("  {}\n", line));
            }
        }

        output
    }
}

fn bar(score: u8) -> String {
    let filled = (score as usize / 10).min(10);
    "\u{2588}".repeat(filled) + &"\u{2591}".repeat(10 - filled)
}

fn score_lines(scores: &Scores) -> String {
    [
        ("Health", scores.health),
        ("Security", scores.security),
        ("Complexity", scores.complexity),
        ("Onboarding", scores.onboarding),
        ("Tech debt", scores.tech_debt),
    ]
    .iter()
    .map(|(label, value)| format!("  {:<11} {} {:>3}\n", label, bar(*value), value))
    .collect()
}
