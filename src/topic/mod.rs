//! Topic names and filters
//!
//! The relay publishes to and subscribes on a single configured topic, so
//! only validation and filter matching are needed here.

mod validation;

pub use validation::{topic_matches_filter, validate_topic_filter, validate_topic_name};
