//! bookfeed: release feeds for the Hardcover book catalog.

pub mod application;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
