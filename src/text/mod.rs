pub mod normalize;
pub mod similarity;

pub use normalize::{canonical_token, contains_progress_marker, normalize_text, tokens};
pub use similarity::similarity_ratio;
