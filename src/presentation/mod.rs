//! HTML rendering for feed item content.

pub mod views;
