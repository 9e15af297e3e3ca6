use serde::{Deserialize, Serialize};

/// An author or series a reader keeps coming back to.
///
/// `id` is the catalog's numeric id, or `0` when only the slug is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub slug: String,
    pub id: i64,
}

impl Interest {
    pub fn new(slug: impl Into<String>, id: i64) -> Self {
        Self {
            slug: slug.into(),
            id,
        }
    }
}

/// Derived reading interests of one user. Sorted by slug, unique per slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInterests {
    pub authors: Vec<Interest>,
    pub series: Vec<Interest>,
    pub found: bool,
}

impl UserInterests {
    pub fn new(authors: Vec<Interest>, series: Vec<Interest>) -> Self {
        Self {
            authors,
            series,
            found: true,
        }
    }

    pub fn not_found() -> Self {
        Self {
            authors: Vec::new(),
            series: Vec::new(),
            found: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty() && self.series.is_empty()
    }
}
