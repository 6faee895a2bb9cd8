//! Context Budgeter
//!
//! Packs files into one labeled text block that never exceeds a character budget.
//! Files are emitted in category priority order (input order within a category).
//! Each file gets an allocation by water-filling over ascending file cost: cheap
//! files are kept whole and what is left is shared evenly by the larger ones. A file
//! whose allocation cannot hold its header, the truncation marker and a minimum
//! excerpt is omitted rather than emitted as a stub.
//!
//! All lengths are counted in `char`s.

use super::classify::classify;
use crate::materializer::SourceFile;
use tracing::debug;

/// Smallest excerpt worth sending for a truncated file
pub const MIN_EXCERPT_CHARS: usize = 120;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedContext {
    pub text: String,
    pub included: Vec<String>,
    pub truncated: Vec<String>,
    pub omitted: Vec<String>,
}

impl PackedContext {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

fn header(path: &str) -> String {
    format!("=== FILE: {} ===\n", path)
}

fn marker(dropped: usize) -> String {
    format!("\n[... truncated {} chars ...]\n", dropped)
}

struct Entry<'a> {
    file: &'a SourceFile,
    content_len: usize,
    header_len: usize,
}

impl Entry<'_> {
    /// Characters needed to emit the file whole, trailing newline included
    fn full_cost(&self) -> usize {
        self.header_len + self.content_len + 1
    }
}

/// Files in packing order: category priority, then input order
fn ordered(files: &[SourceFile]) -> Vec<&SourceFile> {
    let mut ordered: Vec<(usize, &SourceFile)> = files.iter().enumerate().collect();
    ordered.sort_by_key(|(idx, f)| (classify(&f.path).priority(), *idx));
    ordered.into_iter().map(|(_, f)| f).collect()
}

/// Per-entry allocations that sum to at most `budget`
fn allocate(entries: &[Entry<'_>], budget: usize) -> Vec<usize> {
    let mut by_cost: Vec<usize> = (0..entries.len()).collect();
    by_cost.sort_by_key(|&i| (entries[i].full_cost(), i));

    let mut allocations = vec![0; entries.len()];
    let mut remaining = budget;
    for (rank, &i) in by_cost.iter().enumerate() {
        let share = remaining / (entries.len() - rank);
        let allocation = entries[i].full_cost().min(share);
        allocations[i] = allocation;
        remaining -= allocation;
    }
    allocations
}

pub fn pack(files: &[SourceFile], budget: usize) -> PackedContext {
    let entries: Vec<Entry<'_>> = ordered(files)
        .into_iter()
        .map(|file| Entry {
            file,
            content_len: file.content.chars().count(),
            header_len: header(&file.path).chars().count(),
        })
        .collect();
    let allocations = allocate(&entries, budget);

    let mut packed = PackedContext::default();
    for (entry, allocation) in entries.iter().zip(allocations) {
        let path = entry.file.path.clone();

        if allocation >= entry.full_cost() {
            packed.text.push_str(&header(&path));
            packed.text.push_str(&entry.file.content);
            packed.text.push('\n');
            packed.included.push(path);
            continue;
        }

        // Marker sized for the worst case; the real one is never longer
        let reserved = entry.header_len + marker(entry.content_len).chars().count();
        let excerpt_len = allocation.saturating_sub(reserved);
        if excerpt_len < MIN_EXCERPT_CHARS.min(entry.content_len) || excerpt_len == 0 {
            packed.omitted.push(path);
            continue;
        }

        let excerpt: String = entry.file.content.chars().take(excerpt_len).collect();
        packed.text.push_str(&header(&path));
        packed.text.push_str(&excerpt);
        packed
            .text
            .push_str(&marker(entry.content_len - excerpt_len));
        packed.included.push(path.clone());
        packed.truncated.push(path);
    }

    debug!(
        budget,
        used = packed.char_len(),
        included = packed.included.len(),
        truncated = packed.truncated.len(),
        omitted = packed.omitted.len(),
        "Packed context"
    );
    packed
}

/// Packed text of `files`, at most `budget` chars
pub fn pack_context(files: &[SourceFile], budget: usize) -> String {
    pack(files, budget).text
}

/// Short per-file previews (first `preview_chars` chars of each file) packed under `budget`
pub fn build_previews(files: &[SourceFile], preview_chars: usize, budget: usize) -> String {
    let previews: Vec<SourceFile> = files
        .iter()
        .map(|f| SourceFile::new(f.path.clone(), f.content.chars().take(preview_chars).collect::<String>()))
        .collect();
    pack_context(&previews, budget)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, len: usize) -> SourceFile {
        let content: String = (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        SourceFile::new(path, content)
    }

    fn sample() -> Vec<SourceFile> {
        vec![
            file("README.md", 900),
            file("src/main.rs", 2_000),
            file("src/routes/users.rs", 1_500),
            file("Cargo.toml", 150),
            file("tests/it.rs", 700),
            SourceFile::new("src/unicode.rs", "// héllo wörld ✓\n".repeat(40)),
        ]
    }

    #[test]
    fn test_never_exceeds_budget() {
        let files = sample();
        for budget in (0..6_000).step_by(37).chain([0, 1, 10, 100, 1_000_000]) {
            let packed = pack(&files, budget);
            assert!(
                packed.char_len() <= budget,
                "budget {} exceeded: {}",
                budget,
                packed.char_len()
            );
        }
    }

    #[test]
    fn test_everything_fits_whole() {
        let files = sample();
        let packed = pack(&files, 1_000_000);
        assert_eq!(packed.included.len(), files.len());
        assert!(packed.truncated.is_empty());
        assert!(packed.omitted.is_empty());
        for f in &files {
            assert!(packed.text.contains(&format!("=== FILE: {} ===\n{}\n", f.path, f.content)));
        }
    }

    #[test]
    fn test_priority_order_in_output() {
        let packed = pack(&sample(), 1_000_000);
        let api = packed.text.find("src/routes/users.rs").unwrap();
        let source = packed.text.find("src/main.rs").unwrap();
        let config = packed.text.find("Cargo.toml").unwrap();
        let docs = packed.text.find("README.md").unwrap();
        assert!(api < source && source < config && config < docs);
    }

    #[test]
    fn test_small_files_survive_tight_budget() {
        let files = vec![file("src/big.rs", 10_000), file("src/small.rs", 50)];
        let packed = pack(&files, 1_000);

        assert!(packed.text.contains(&files[1].content));
        assert_eq!(packed.truncated, vec!["src/big.rs".to_string()]);
        assert!(packed.text.contains("[... truncated "));
    }

    #[test]
    fn test_truncated_files_are_labeled_and_separate() {
        let files = vec![file("src/a.rs", 3_000), file("src/b.rs", 3_000)];
        let packed = pack(&files, 2_000);

        assert_eq!(packed.truncated.len(), 2);
        let blocks: Vec<&str> = packed.text.split("=== FILE: ").skip(1).collect();
        assert_eq!(blocks.len(), 2);
        for block in blocks {
            assert!(block.trim_end().ends_with("chars ...]"));
        }
    }

    #[test]
    fn test_tiny_allocation_omits_file() {
        let files = vec![file("src/a.rs", 3_000)];
        let packed = pack(&files, 60);
        assert!(packed.text.is_empty());
        assert_eq!(packed.omitted, vec!["src/a.rs".to_string()]);
    }

    #[test]
    fn test_deterministic() {
        let files = sample();
        assert_eq!(pack_context(&files, 2_500), pack_context(&files, 2_500));
    }

    #[test]
    fn test_previews_are_short_prefixes() {
        let files = sample();
        let previews = build_previews(&files, 40, 100_000);
        assert!(previews.contains(&files[1].content[..40]));
        assert!(!previews.contains(&files[1].content[..41]));
        assert!(build_previews(&files, 40, 300).chars().count() <= 300);
    }
}
