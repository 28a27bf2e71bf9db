pub mod aggregate;
pub mod catalog;
pub mod chapter;
pub mod engine;
pub mod extractor;
pub mod matcher;

pub use aggregate::{ChapterAggregator, MAX_LISTINGS};
pub use chapter::{ChapterMention, detect_chapter};
pub use engine::{MatchReport, run_matches};
pub use extractor::{Candidate, MAX_CANDIDATES, extract_candidates};
pub use matcher::{SearchTerm, is_match};
