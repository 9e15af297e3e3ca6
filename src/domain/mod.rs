//! Domain layer types and invariants.

pub mod books;
pub mod interests;
pub mod slug;

pub use books::{Book, Collection, Image, Series};
pub use interests::{Interest, UserInterests};
