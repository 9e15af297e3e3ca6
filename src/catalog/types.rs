//! Raw response shapes of the Hardcover GraphQL API.
//!
//! Everything the catalog may leave `null` is optional or defaulted here; the
//! mapper decides what a missing field means.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBook {
    pub id: i64,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub release_date: Option<String>,
    pub compilation: Option<bool>,
    pub headline: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub genres: Vec<RawGenre>,
    pub image: Option<RawImage>,
    #[serde(deserialize_with = "null_as_default")]
    pub contributions: Vec<RawContribution>,
    pub featured_series: Option<RawFeaturedSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawGenre {
    pub tag: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawImage {
    pub url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawContribution {
    /// Contributor role; `None` means the catalog left it unspecified.
    pub contribution: Option<String>,
    pub author: RawAuthorRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthorRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFeaturedSeries {
    pub position: Option<f32>,
    pub series: Option<RawSeriesRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSeriesRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Wrapper used by join tables (`contributions`, `book_series`, `user_books`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawBookRef {
    pub book: RawBook,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRecentReleases {
    pub books: Vec<RawBook>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthorReleases {
    pub authors: Vec<RawAuthor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAuthor {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub contributions: Vec<RawBookRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSeriesReleases {
    pub series: Vec<RawSeries>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSeries {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub book_series: Vec<RawBookRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUserBooks {
    pub users: Vec<RawUser>,
    pub user_books: Vec<RawBookRef>,
}

impl RawUserBooks {
    /// The catalog returns no user row for an unknown username.
    pub fn user_exists(&self) -> bool {
        !self.users.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUser {
    pub id: i64,
    pub username: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
