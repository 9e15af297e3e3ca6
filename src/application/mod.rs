//! Application services: interest derivation, release aggregation and feeds.

pub mod error;
pub mod feed;
pub mod interests;
pub mod mapper;
pub mod releases;
pub mod syndication;
