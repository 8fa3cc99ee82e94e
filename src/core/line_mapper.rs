use crate::core::diff_parser::ParsedPatch;
use std::collections::BTreeSet;

/// Target line numbers of every added line in the patch. Findings from the
/// fast analyzers are kept only when their line is in this set.
pub fn changed_target_lines(patch: &ParsedPatch) -> BTreeSet<u32> {
    patch
        .added_lines()
        .filter_map(|line| line.target_line_no)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DiffParser;

    #[test]
    fn collects_added_lines_across_hunks() {
        let diff = "\
@@ -1,2 +1,3 @@
 heading
+inserted
 body
@@ -20,2 +21,2 @@
-before
+after
 tail
";
        let patch = DiffParser::parse(diff, "doc.md").unwrap();
        let lines: Vec<u32> = changed_target_lines(&patch).into_iter().collect();
        assert_eq!(lines, vec![2, 21]);
    }

    #[test]
    fn deletions_and_context_are_not_changed_lines() {
        let diff = "@@ -1,3 +1,2 @@\n keep\n-gone\n keep too\n";
        let patch = DiffParser::parse(diff, "doc.md").unwrap();
        assert!(changed_target_lines(&patch).is_empty());
    }

    #[test]
    fn empty_patch_maps_to_empty_set() {
        let patch = DiffParser::parse("", "doc.md").unwrap();
        assert!(changed_target_lines(&patch).is_empty());
    }
}
