//! Word-level search over a transcript and clip boundary planning.

pub mod boundary;
pub mod index;
pub mod matcher;

pub use boundary::{Interval, TimeRange, merge_expanded, plan};
pub use index::WordIndex;
pub use matcher::{SearchMode, WordMatch, search, search_joined, search_phrase, search_word};
