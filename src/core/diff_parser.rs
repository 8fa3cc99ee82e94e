use crate::errors::{DiffParseError, DiffSyntaxError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@(.*)$")
        .expect("hunk header pattern is valid")
});

/// One file's parsed patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedPatch {
    pub file_path: String,
    pub hunks: Vec<DiffHunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffHunk {
    pub source_start: u32,
    pub source_length: u32,
    pub target_start: u32,
    pub target_length: u32,
    pub header: String,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub change_type: ChangeType,
    pub content: String,
    pub source_line_no: Option<u32>,
    pub target_line_no: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Removed,
    Context,
}

impl ParsedPatch {
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Added lines across all hunks, in patch order.
    pub fn added_lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks
            .iter()
            .flat_map(|hunk| hunk.lines.iter())
            .filter(|line| line.change_type == ChangeType::Added)
    }
}

impl DiffHunk {
    /// Post-image view of the hunk window: context and added lines with
    /// their target line numbers.
    pub fn target_lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.lines.iter().filter_map(|line| {
            line.target_line_no
                .map(|line_no| (line_no, line.content.as_str()))
        })
    }
}

pub struct DiffParser;

impl DiffParser {
    /// Parses a platform per-file patch. Those patches start directly at the
    /// first `@@` header, so a `--- a/` / `+++ b/` header is synthesized
    /// before parsing. An empty patch yields a patch with no hunks.
    pub fn parse(diff_text: &str, filename: &str) -> Result<ParsedPatch, DiffParseError> {
        let with_header = format!("--- a/{filename}\n+++ b/{filename}\n{diff_text}");
        Self::parse_file_diff(&with_header).map_err(|source| DiffParseError {
            filename: filename.to_string(),
            source,
        })
    }

    /// Parses a single-file unified diff that carries its own file header.
    pub fn parse_file_diff(diff_content: &str) -> Result<ParsedPatch, DiffSyntaxError> {
        let lines: Vec<&str> = diff_content.lines().collect();
        if lines.len() < 2 || !lines[0].starts_with("--- ") || !lines[1].starts_with("+++ ") {
            return Err(DiffSyntaxError::MissingFileHeader);
        }

        let old_path = Self::extract_path_from_header(lines[0], "--- ");
        let new_path = Self::extract_path_from_header(lines[1], "+++ ");
        let file_path = if new_path != "/dev/null" {
            new_path
        } else {
            old_path
        };

        let body = &lines[2..];
        let mut hunks = Vec::new();
        let mut i = 0;

        while i < body.len() {
            let line = body[i];
            if line.starts_with("@@") {
                hunks.push(Self::parse_hunk(body, &mut i)?);
            } else if line.trim().is_empty() || line.starts_with('\\') {
                i += 1;
            } else {
                return Err(DiffSyntaxError::UnexpectedLine {
                    line_no: i + 1,
                    line: line.to_string(),
                });
            }
        }

        Ok(ParsedPatch { file_path, hunks })
    }

    fn extract_path_from_header(line: &str, prefix: &str) -> String {
        let raw = line.strip_prefix(prefix).unwrap_or(line).trim();
        let path = raw.split('\t').next().unwrap_or(raw);
        path.trim_start_matches("a/")
            .trim_start_matches("b/")
            .to_string()
    }

    fn parse_hunk(lines: &[&str], i: &mut usize) -> Result<DiffHunk, DiffSyntaxError> {
        let header_line_no = *i + 1;
        let header = lines[*i];
        let (source_start, source_length, target_start, target_length) =
            Self::parse_hunk_header(header).ok_or_else(|| DiffSyntaxError::InvalidHunkHeader {
                line_no: header_line_no,
                header: header.to_string(),
            })?;
        *i += 1;

        let mut changes = Vec::new();
        // Counted wide so a window ending past u32::MAX is reported, not wrapped.
        let mut source_line = u64::from(source_start);
        let mut target_line = u64::from(target_start);
        let mut source_remaining = source_length;
        let mut target_remaining = target_length;

        while source_remaining > 0 || target_remaining > 0 {
            let line = lines.get(*i).ok_or(DiffSyntaxError::HunkTooShort {
                line_no: header_line_no,
            })?;
            let unexpected = || DiffSyntaxError::UnexpectedHunkLine {
                line_no: *i + 1,
                line: line.to_string(),
            };

            let (change_type, content) = match line.chars().next() {
                Some('+') => (ChangeType::Added, &line[1..]),
                Some('-') => (ChangeType::Removed, &line[1..]),
                Some(' ') => (ChangeType::Context, &line[1..]),
                // Some tools strip the single space of an empty context line.
                None => (ChangeType::Context, ""),
                Some('\\') => {
                    *i += 1;
                    continue;
                }
                Some(_) => return Err(unexpected()),
            };

            let diff_line = match change_type {
                ChangeType::Added => {
                    if target_remaining == 0 {
                        return Err(unexpected());
                    }
                    target_remaining -= 1;
                    let line_no = line_number(target_line, *i)?;
                    target_line += 1;
                    DiffLine {
                        change_type,
                        content: content.to_string(),
                        source_line_no: None,
                        target_line_no: Some(line_no),
                    }
                }
                ChangeType::Removed => {
                    if source_remaining == 0 {
                        return Err(unexpected());
                    }
                    source_remaining -= 1;
                    let line_no = line_number(source_line, *i)?;
                    source_line += 1;
                    DiffLine {
                        change_type,
                        content: content.to_string(),
                        source_line_no: Some(line_no),
                        target_line_no: None,
                    }
                }
                ChangeType::Context => {
                    if source_remaining == 0 || target_remaining == 0 {
                        return Err(unexpected());
                    }
                    source_remaining -= 1;
                    target_remaining -= 1;
                    let source_no = line_number(source_line, *i)?;
                    let target_no = line_number(target_line, *i)?;
                    source_line += 1;
                    target_line += 1;
                    DiffLine {
                        change_type,
                        content: content.to_string(),
                        source_line_no: Some(source_no),
                        target_line_no: Some(target_no),
                    }
                }
            };

            changes.push(diff_line);
            *i += 1;
        }

        while lines.get(*i).is_some_and(|line| line.starts_with('\\')) {
            *i += 1;
        }

        Ok(DiffHunk {
            source_start,
            source_length,
            target_start,
            target_length,
            header: header.to_string(),
            lines: changes,
        })
    }

    fn parse_hunk_header(header: &str) -> Option<(u32, u32, u32, u32)> {
        let caps = HUNK_HEADER.captures(header)?;
        let number = |idx: usize, default: u32| -> Option<u32> {
            match caps.get(idx) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(default),
            }
        };

        Some((number(1, 0)?, number(2, 1)?, number(3, 0)?, number(4, 1)?))
    }
}

fn line_number(counter: u64, index: usize) -> Result<u32, DiffSyntaxError> {
    u32::try_from(counter).map_err(|_| DiffSyntaxError::LineNumberOverflow { line_no: index + 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_HUNKS: &str = "\
@@ -1,3 +1,4 @@
 # Title
-Intro text
+Intro text, revised
+A new paragraph
 Closing
@@ -10,2 +11,2 @@ ## Section
 keep
-old tail
+new tail
";

    #[test]
    fn empty_patch_has_no_hunks() {
        let patch = DiffParser::parse("", "file.md").unwrap();
        assert!(patch.is_empty());
        assert_eq!(patch.file_path, "file.md");
    }

    #[test]
    fn tracks_source_and_target_line_numbers() {
        let patch = DiffParser::parse(TWO_HUNKS, "README.md").unwrap();
        assert_eq!(patch.hunks.len(), 2);

        let first = &patch.hunks[0];
        assert_eq!((first.source_start, first.source_length), (1, 3));
        assert_eq!((first.target_start, first.target_length), (1, 4));
        let numbered: Vec<_> = first
            .lines
            .iter()
            .map(|l| (l.change_type, l.source_line_no, l.target_line_no))
            .collect();
        assert_eq!(
            numbered,
            vec![
                (ChangeType::Context, Some(1), Some(1)),
                (ChangeType::Removed, Some(2), None),
                (ChangeType::Added, None, Some(2)),
                (ChangeType::Added, None, Some(3)),
                (ChangeType::Context, Some(3), Some(4)),
            ]
        );

        let second = &patch.hunks[1];
        assert_eq!(second.header, "@@ -10,2 +11,2 @@ ## Section");
        assert_eq!(second.lines[2].target_line_no, Some(12));
        assert_eq!(second.lines[2].content, "new tail");
    }

    #[test]
    fn post_image_window_is_context_plus_added() {
        let patch = DiffParser::parse(TWO_HUNKS, "README.md").unwrap();
        let window: Vec<_> = patch.hunks[0].target_lines().collect();
        assert_eq!(
            window,
            vec![
                (1, "# Title"),
                (2, "Intro text, revised"),
                (3, "A new paragraph"),
                (4, "Closing"),
            ]
        );
    }

    #[test]
    fn omitted_lengths_default_to_one() {
        let patch = DiffParser::parse("@@ -5 +5 @@\n-a\n+b\n", "x.md").unwrap();
        let hunk = &patch.hunks[0];
        assert_eq!((hunk.source_length, hunk.target_length), (1, 1));
        assert_eq!(hunk.lines[1].target_line_no, Some(5));
    }

    #[test]
    fn pure_insertion_hunk() {
        let patch = DiffParser::parse("@@ -10,0 +10,1 @@\n+hello world\n", "x.md").unwrap();
        let added: Vec<_> = patch.added_lines().collect();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].target_line_no, Some(10));
        assert_eq!(added[0].content, "hello world");
    }

    #[test]
    fn removed_lines_that_look_like_headers_stay_in_hunk() {
        let diff = "@@ -1 +1 @@\n---- a rule\n+++ plus\n";
        let patch = DiffParser::parse(diff, "x.md").unwrap();
        assert_eq!(patch.hunks[0].lines[0].content, "--- a rule");
        assert_eq!(patch.hunks[0].lines[1].content, "++ plus");
    }

    #[test]
    fn no_newline_marker_is_skipped() {
        let diff = "@@ -1 +1 @@\n-old\n\\ No newline at end of file\n+new\n\\ No newline at end of file\n";
        let patch = DiffParser::parse(diff, "x.md").unwrap();
        assert_eq!(patch.hunks[0].lines.len(), 2);
    }

    #[test]
    fn rejects_malformed_header() {
        let err = DiffParser::parse("@@ -a,b +c @@\n+x\n", "bad.md").unwrap_err();
        assert_eq!(err.filename, "bad.md");
        assert!(matches!(
            err.source,
            DiffSyntaxError::InvalidHunkHeader { line_no: 1, .. }
        ));
    }

    #[test]
    fn rejects_short_hunk() {
        let err = DiffParser::parse("@@ -1,2 +1,2 @@\n context\n", "short.md").unwrap_err();
        assert_eq!(err.source, DiffSyntaxError::HunkTooShort { line_no: 1 });
    }

    #[test]
    fn rejects_text_outside_hunks() {
        let err = DiffParser::parse("not a diff at all", "prose.md").unwrap_err();
        assert!(matches!(err.source, DiffSyntaxError::UnexpectedLine { .. }));
    }

    #[test]
    fn rejects_extra_lines_past_declared_counts() {
        let err = DiffParser::parse("@@ -1 +1 @@\n-a\n+b\n+c\n", "long.md").unwrap_err();
        assert!(matches!(err.source, DiffSyntaxError::UnexpectedLine { line_no: 4, .. }));
    }

    #[test]
    fn rejects_line_numbers_past_u32_max() {
        let err = DiffParser::parse("@@ -1 +4294967295,2 @@\n+a\n+b\n", "x.md").unwrap_err();
        assert_eq!(err.source, DiffSyntaxError::LineNumberOverflow { line_no: 3 });
    }

    #[test]
    fn last_line_may_sit_at_u32_max() {
        let patch = DiffParser::parse("@@ -0,0 +4294967294,2 @@\n+a\n+b\n", "x.md").unwrap();
        let numbers: Vec<_> = patch.hunks[0].lines.iter().map(|l| l.target_line_no).collect();
        assert_eq!(numbers, vec![Some(u32::MAX - 1), Some(u32::MAX)]);
    }

    #[test]
    fn parse_file_diff_requires_header() {
        assert_eq!(
            DiffParser::parse_file_diff("@@ -1 +1 @@\n-a\n+b\n").unwrap_err(),
            DiffSyntaxError::MissingFileHeader
        );
    }
}
