//! Path-based file classification
//!
//! Drives budgeter priority, writer context selection and the static metrics.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Api,
    Source,
    Config,
    Test,
    Docs,
    Other,
}

impl FileCategory {
    /// Lower is packed first
    pub fn priority(self) -> u8 {
        match self {
            FileCategory::Api => 0,
            FileCategory::Source => 1,
            FileCategory::Config => 2,
            FileCategory::Test => 3,
            FileCategory::Docs => 4,
            FileCategory::Other => 5,
        }
    }
}

const API_DIRS: &[&str] = &["api", "routes", "controllers", "handlers", "endpoints", "graphql"];
const API_STEMS: &[&str] = &["route", "controller", "handler", "endpoint", "resolver"];
const TEST_DIRS: &[&str] = &["test", "tests", "__tests__", "spec", "specs", "testdata"];
const DOC_DIRS: &[&str] = &["docs", "doc"];
const CONFIG_NAMES: &[&str] = &[
    "dockerfile",
    "makefile",
    "package.json",
    "cargo.toml",
    "go.mod",
    "pyproject.toml",
    "requirements.txt",
    "pom.xml",
    "build.gradle",
    "docker-compose.yml",
    "docker-compose.yaml",
    ".gitignore",
    ".editorconfig",
];
const CONFIG_EXTS: &[&str] = &[
    "toml", "yaml", "yml", "json", "ini", "cfg", "conf", "env", "properties", "lock", "xml",
];
const DOC_EXTS: &[&str] = &["md", "rst", "adoc", "txt"];

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn dirs(path: &Path) -> Vec<String> {
    path.parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

fn is_test_file(name: &str, stem: &str, dirs: &[String]) -> bool {
    dirs.iter().any(|d| TEST_DIRS.contains(&d.as_str()))
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
        || stem.starts_with("test_")
        || name.contains(".test.")
        || name.contains(".spec.")
        || (stem.ends_with("test") && stem.len() > 4 && name.ends_with(".java"))
}

pub fn classify(path: &str) -> FileCategory {
    let path = Path::new(path);
    let name = file_name(path);
    let ext = extension(path);
    let stem = name.strip_suffix(&format!(".{}", ext)).unwrap_or(&name).to_string();
    let dirs = dirs(path);

    if is_test_file(&name, &stem, &dirs) {
        return FileCategory::Test;
    }

    if DOC_EXTS.contains(&ext.as_str()) && !CONFIG_NAMES.contains(&name.as_str())
        || dirs.first().is_some_and(|d| DOC_DIRS.contains(&d.as_str()))
        || stem == "license"
    {
        return FileCategory::Docs;
    }

    let is_code = language_for(path).is_some();
    let api_schema = matches!(ext.as_str(), "proto" | "graphql" | "gql")
        || stem.contains("openapi")
        || stem.contains("swagger");
    let api_code = is_code
        && (dirs.iter().any(|d| API_DIRS.contains(&d.as_str()))
            || API_STEMS.iter().any(|s| stem.contains(s))
            || stem == "api"
            || stem.starts_with("api_")
            || stem.ends_with("_api"));
    if api_schema || api_code {
        return FileCategory::Api;
    }

    if CONFIG_NAMES.contains(&name.as_str())
        || CONFIG_EXTS.contains(&ext.as_str())
        || name.starts_with(".env")
    {
        return FileCategory::Config;
    }

    if is_code {
        return FileCategory::Source;
    }

    FileCategory::Other
}

/// Language name by file extension
pub fn language_for(path: &Path) -> Option<&'static str> {
    let lang = match extension(path).as_str() {
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "java" => "Java",
        "kt" | "kts" => "Kotlin",
        "rb" => "Ruby",
        "php" => "PHP",
        "cs" => "C#",
        "c" | "h" => "C",
        "cpp" | "cc" | "cxx" | "hpp" => "C++",
        "swift" => "Swift",
        "scala" => "Scala",
        "ex" | "exs" => "Elixir",
        "sh" | "bash" => "Shell",
        "sql" => "SQL",
        "html" | "htm" => "HTML",
        "css" | "scss" => "CSS",
        "vue" => "Vue",
        "svelte" => "Svelte",
        "dart" => "Dart",
        "lua" => "Lua",
        _ => return None,
    };
    Some(lang)
}
