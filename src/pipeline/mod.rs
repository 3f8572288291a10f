//! Pipeline components: directory walk, name matching, directory-driven submission.

pub mod matcher;
pub mod visitor;
pub mod walk;

pub use matcher::NameMatcher;
pub use visitor::DirectorySubmitter;
pub use walk::{WalkEvent, WalkEvents, to_event_walkdir, walk_events};
