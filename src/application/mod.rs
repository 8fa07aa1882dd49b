//! Content lookups, aggregation and the freshness engine.

pub mod aggregate;
pub mod clock;
pub mod content;
pub mod error;
pub mod freshness;
pub mod source;
