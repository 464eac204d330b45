pub mod detail;
pub mod listing;

pub use detail::MetrographExtractor;
pub use listing::{extract_film_id, MetrographListingParser};
