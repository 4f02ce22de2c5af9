pub mod entry;

pub use entry::{review_count_from_json, Coordinates, Entry, Review};
