//! Heuristic ranking of candidate files for the related-files phase

use crate::project::ProjectFile;
use crate::utils::path::{file_stem, parent_dir};

/// Point weights for the relevance heuristics.
///
/// The values are tunable, but their ordering is part of the behavior:
/// directory > name > extension > test pairing > size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceWeights {
    pub same_directory: f64,
    pub similar_name: f64,
    pub same_extension: f64,
    pub test_pairing: f64,
    pub small_file: f64,
    /// Files at or below this size receive the small-file bonus
    pub small_file_bytes: u64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            same_directory: 10.0,
            similar_name: 5.0,
            same_extension: 3.0,
            test_pairing: 2.0,
            small_file: 1.0,
            small_file_bytes: 10 * 1024,
        }
    }
}

/// Facts about the current file the scorer compares candidates against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringAnchor {
    /// File stem of the current file (`app.test` for `app.test.ts`)
    pub base_name: String,
    /// Project-relative directory of the current file ("" at the root)
    pub directory: String,
    /// Extension of the current file, without the dot
    pub extension: String,
}

impl ScoringAnchor {
    /// Derive the anchor from a project-relative path
    pub fn from_relative_path(relative: &str) -> Self {
        Self {
            base_name: file_stem(relative),
            directory: parent_dir(relative).to_string(),
            extension: crate::utils::path::extension(relative),
        }
    }
}

/// Scores candidate files; pure, no I/O
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    weights: RelevanceWeights,
}

const TEST_MARKERS: &[&str] = &[".test", ".spec", "_test", "_spec", "test_", "spec_"];

impl RelevanceScorer {
    pub fn new(weights: RelevanceWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RelevanceWeights {
        &self.weights
    }

    /// Score a candidate whose project-relative path is `relative`
    pub fn score(&self, candidate: &ProjectFile, relative: &str, anchor: &ScoringAnchor) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        if parent_dir(relative) == anchor.directory {
            score += w.same_directory;
        }

        let candidate_stem = file_stem(relative);
        let candidate_core = strip_test_markers(&candidate_stem);
        let anchor_core = strip_test_markers(&anchor.base_name);
        if names_similar(&candidate_core, &anchor_core) {
            score += w.similar_name;
        }

        if !anchor.extension.is_empty() && candidate.extension.eq_ignore_ascii_case(&anchor.extension) {
            score += w.same_extension;
        }

        let candidate_is_test = is_test_name(&candidate_stem);
        let anchor_is_test = is_test_name(&anchor.base_name);
        if candidate_is_test != anchor_is_test && candidate_core.eq_ignore_ascii_case(&anchor_core) {
            score += w.test_pairing;
        }

        if candidate.size <= w.small_file_bytes {
            score += w.small_file;
        }

        score
    }
}

/// Whether a file stem names a test (`foo.test`, `foo_spec`, `test_foo`)
pub fn is_test_name(stem: &str) -> bool {
    let lower = stem.to_ascii_lowercase();
    lower == "test"
        || lower == "tests"
        || lower.ends_with(".test")
        || lower.ends_with(".spec")
        || lower.ends_with("_test")
        || lower.ends_with("_spec")
        || lower.starts_with("test_")
        || lower.starts_with("spec_")
}

fn strip_test_markers(stem: &str) -> String {
    let mut core = stem.to_ascii_lowercase();
    for marker in TEST_MARKERS {
        if marker.ends_with('_') {
            if let Some(rest) = core.strip_prefix(marker) {
                core = rest.to_string();
            }
        } else if let Some(rest) = core.strip_suffix(marker) {
            core = rest.to_string();
        }
    }
    core
}

/// Names are similar if one contains the other, ignoring very short stems
fn names_similar(a: &str, b: &str) -> bool {
    const MIN_LEN: usize = 3;
    if a.len() < MIN_LEN || b.len() < MIN_LEN {
        return a == b && !a.is_empty();
    }
    a.contains(b) || b.contains(a)
}
