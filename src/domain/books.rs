//! Book and collection records shared by the cache, the aggregator and the feed layer.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A single catalog book after mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub link: String,
    #[serde(with = "time::serde::rfc3339")]
    pub release_date: OffsetDateTime,
    pub compilation: bool,
    pub headline: String,
    pub description: String,
    pub genres: Vec<String>,
    pub authors: Vec<String>,
    pub image: Image,
    pub series: Series,
}

impl Book {
    /// First credited author, used as the feed item author.
    pub fn primary_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }
}

/// Cover image. Zero width or height means the catalog reported no dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Image {
    pub fn has_dimensions(&self) -> bool {
        self.width != 0 && self.height != 0
    }
}

/// Featured series membership. Positions may be fractional (novellas between volumes).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub title: String,
    pub position: f32,
}

/// A named group of books: an author's releases, a series, a user's merged feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub slug: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    pub books: Vec<Book>,
    pub found: bool,
}

impl Collection {
    pub fn new(name: impl Into<String>, slug: impl Into<String>, books: Vec<Book>) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            created: OffsetDateTime::now_utc(),
            books,
            found: true,
        }
    }

    /// Negative result for an entity the catalog does not know. Carries no books.
    pub fn not_found(slug: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            slug: slug.into(),
            created: OffsetDateTime::now_utc(),
            books: Vec::new(),
            found: false,
        }
    }
}
