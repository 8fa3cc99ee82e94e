use crate::core::diff_parser::{ChangeType, DiffParser, ParsedPatch};
use crate::errors::DiffParseError;
use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffTag};
use std::collections::VecDeque;

/// An added line whose words differ from the removed line it replaces, or a
/// line with no removed counterpart at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePart {
    pub target_line_no: u32,
    /// The whole added line, trimmed.
    pub changed_text: String,
    /// Words of the added line covered by insert/replace opcodes.
    pub changed_words: Vec<String>,
}

/// Re-parses `diff_text` and extracts its change parts.
pub fn extract_changed_parts(
    diff_text: &str,
    filename: &str,
) -> Result<Vec<ChangePart>, DiffParseError> {
    let patch = DiffParser::parse(diff_text, filename)?;
    Ok(changed_parts(&patch))
}

/// Pairs removed and added lines within each hunk, oldest removed line first.
/// Context lines close a replace block and drop any unpaired removals.
pub fn changed_parts(patch: &ParsedPatch) -> Vec<ChangePart> {
    let mut parts = Vec::new();

    for hunk in &patch.hunks {
        let mut pending_removed: VecDeque<&str> = VecDeque::new();

        for line in &hunk.lines {
            match line.change_type {
                ChangeType::Removed => pending_removed.push_back(&line.content),
                ChangeType::Context => pending_removed.clear(),
                ChangeType::Added => {
                    let Some(target_line_no) = line.target_line_no else {
                        continue;
                    };
                    let added = line.content.as_str();

                    let changed_words = match pending_removed.pop_front() {
                        Some(removed) => match word_changes(removed, added) {
                            Some(words) => words,
                            None => continue,
                        },
                        None => added.split_whitespace().map(str::to_string).collect(),
                    };

                    parts.push(ChangePart {
                        target_line_no,
                        changed_text: added.trim().to_string(),
                        changed_words,
                    });
                }
            }
        }
    }

    parts
}

/// Word-level LCS alignment of a removed/added pair. `None` when both lines
/// hold the same words; otherwise the added-side words of every non-equal op
/// (empty when the change only deletes words).
fn word_changes(removed: &str, added: &str) -> Option<Vec<String>> {
    let old_words: Vec<&str> = removed.split_whitespace().collect();
    let new_words: Vec<&str> = added.split_whitespace().collect();

    let ops = capture_diff_slices(Algorithm::Lcs, &old_words, &new_words);
    if ops.iter().all(|op| op.tag() == DiffTag::Equal) {
        return None;
    }

    let words = ops
        .iter()
        .filter(|op| op.tag() != DiffTag::Equal)
        .flat_map(|op| new_words[op.new_range()].iter().map(|w| w.to_string()))
        .collect();
    Some(words)
}
