pub mod change_parts;
pub mod comment;
pub mod dedup;
pub mod diff_parser;
pub mod handlers;
pub mod line_mapper;
pub mod orchestrator;

pub use change_parts::{changed_parts, extract_changed_parts, ChangePart};
pub use comment::{Finding, ReviewComment, ReviewOutcome, ReviewStatus, Side};
pub use dedup::{build_existing_key_set, is_duplicate, CommentKeySet, ExistingCommentKey, KeyPolicy};
pub use diff_parser::{ChangeType, DiffHunk, DiffLine, DiffParser, ParsedPatch};
pub use handlers::{FileMatcher, FilePipeline, HandlerRegistry};
pub use line_mapper::changed_target_lines;
pub use orchestrator::Reviewer;
