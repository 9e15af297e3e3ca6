//! Release aggregation.
//!
//! Four request shapes share one collection cache: recent releases, one
//! author, one series, and a user's merged interests. Author and series
//! lookups always go through the bulk path, even for a single slug, so a
//! direct feed request and the user aggregation warm the same entries.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use thiserror::Error;
use time::Duration;
use tracing::{error, info};

use crate::{
    cache::{
        BulkLoader, BulkOutcome, CollectionCache, InterestCache, Loader, RECENT_RELEASES_KEY,
        author_key, series_key,
    },
    catalog::{CatalogClient, CatalogError, RawBook, ReleaseWindow},
    domain::{Book, Collection, Interest, UserInterests, slug::slug_from_key},
};

use super::{
    interests::InterestResolver,
    mapper::map_books,
};

const RECENT_NAME: &str = "Recent";
const RECENT_SLUG: &str = "upcoming/recent";

/// Lookback windows and query switches for the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOptions {
    pub recent_lookback: Duration,
    pub entity_lookback: Duration,
    pub library_lookback: Duration,
    pub include_compilations: bool,
}

impl Default for ReleaseOptions {
    fn default() -> Self {
        Self {
            recent_lookback: Duration::days(30),
            entity_lookback: Duration::days(365),
            library_lookback: Duration::days(730),
            include_compilations: false,
        }
    }
}

/// Which interest kinds a user feed includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseFilter {
    #[default]
    All,
    Author,
    Series,
}

impl ReleaseFilter {
    pub fn includes_authors(self) -> bool {
        matches!(self, ReleaseFilter::All | ReleaseFilter::Author)
    }

    pub fn includes_series(self) -> bool {
        matches!(self, ReleaseFilter::All | ReleaseFilter::Series)
    }
}

impl FromStr for ReleaseFilter {
    type Err = ReleaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(ReleaseFilter::All),
            "author" | "authors" => Ok(ReleaseFilter::Author),
            "series" => Ok(ReleaseFilter::Series),
            _ => Err(ReleaseError::InvalidFilter(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Author,
    Series,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Author => "author",
            EntityKind::Series => "series",
            EntityKind::User => "user",
        })
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("{kind} `{slug}` not found")]
    NotFound { kind: EntityKind, slug: String },
    #[error("unknown filter `{0}`")]
    InvalidFilter(String),
    #[error("catalog request failed")]
    Upstream(#[source] Arc<CatalogError>),
}

impl ReleaseError {
    fn not_found(kind: EntityKind, slug: &str) -> Self {
        Self::NotFound {
            kind,
            slug: slug.to_string(),
        }
    }
}

/// A user's merged feed plus what went into it.
#[derive(Debug, Clone)]
pub struct UserReleases {
    pub collection: Collection,
    /// Interests that were aggregated, after filtering.
    pub interests: UserInterests,
    /// Branches whose upstream fetch failed; their books are missing or partial.
    pub failed: Vec<EntityKind>,
}

impl UserReleases {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub struct ReleaseAggregator {
    catalog: Arc<dyn CatalogClient>,
    collections: Arc<CollectionCache>,
    interests: InterestResolver,
    options: ReleaseOptions,
}

impl ReleaseAggregator {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        collections: Arc<CollectionCache>,
        interests: Arc<InterestCache>,
        options: ReleaseOptions,
    ) -> Self {
        let resolver = InterestResolver::new(catalog.clone(), interests, options.library_lookback);
        Self {
            catalog,
            collections,
            interests: resolver,
            options,
        }
    }

    pub async fn recent_releases(&self) -> Result<Collection, ReleaseError> {
        let loader = RecentLoader {
            catalog: self.catalog.as_ref(),
            lookback: self.options.recent_lookback,
        };
        self.collections
            .get(RECENT_RELEASES_KEY, &loader)
            .await
            .map_err(ReleaseError::Upstream)
    }

    pub async fn author_releases(&self, slug: &str) -> Result<Collection, ReleaseError> {
        self.entity_releases(Branch::Author, slug).await
    }

    pub async fn series_releases(&self, slug: &str) -> Result<Collection, ReleaseError> {
        self.entity_releases(Branch::Series, slug).await
    }

    async fn entity_releases(&self, branch: Branch, slug: &str) -> Result<Collection, ReleaseError> {
        let key = branch.key(slug);
        let loader = self.releases_loader(branch, &[]);
        let mut outcome = self
            .collections
            .bulk_get(std::slice::from_ref(&key), &loader)
            .await;

        if let Some(err) = outcome.error {
            return Err(ReleaseError::Upstream(err));
        }
        match outcome.entries.remove(&key) {
            Some(collection) if collection.found => Ok(collection),
            _ => Err(ReleaseError::not_found(branch.kind(), slug)),
        }
    }

    /// Releases from every author and series `username` reads repeatedly.
    ///
    /// The series and author fetches run concurrently. A failing branch is
    /// logged and reported in [`UserReleases::failed`]; the other branch's
    /// books are still returned.
    pub async fn user_releases(
        &self,
        username: &str,
        filter: ReleaseFilter,
    ) -> Result<UserReleases, ReleaseError> {
        let interests = self
            .interests
            .resolve(username)
            .await
            .map_err(ReleaseError::Upstream)?;
        if !interests.found {
            return Err(ReleaseError::not_found(EntityKind::User, username));
        }

        let series: Vec<Interest> = if filter.includes_series() {
            interests.series
        } else {
            Vec::new()
        };
        let authors: Vec<Interest> = if filter.includes_authors() {
            interests.authors
        } else {
            Vec::new()
        };

        let series_keys: Vec<String> = series.iter().map(|i| series_key(&i.slug)).collect();
        let author_keys: Vec<String> = authors.iter().map(|i| author_key(&i.slug)).collect();
        let series_loader = self.releases_loader(Branch::Series, &series);
        let author_loader = self.releases_loader(Branch::Author, &authors);

        let started = Instant::now();
        let (series_outcome, author_outcome) = tokio::join!(
            self.collections.bulk_get(&series_keys, &series_loader),
            self.collections.bulk_get(&author_keys, &author_loader),
        );

        let mut failed = Vec::new();
        let series_books = collect_branch(username, Branch::Series, &series_keys, series_outcome, &mut failed);
        let author_books = collect_branch(username, Branch::Author, &author_keys, author_outcome, &mut failed);
        let books = merge_books([series_books, author_books]);

        info!(
            target = "bookfeed::application::releases",
            user = username,
            series = series.len(),
            authors = authors.len(),
            books = books.len(),
            partial = !failed.is_empty(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregated user releases"
        );

        Ok(UserReleases {
            collection: Collection::new(username, format!("@{username}"), books),
            interests: UserInterests::new(authors, series),
            failed,
        })
    }

    fn releases_loader<'a>(&'a self, branch: Branch, interests: &[Interest]) -> ReleasesLoader<'a> {
        ReleasesLoader {
            branch,
            catalog: self.catalog.as_ref(),
            window: ReleaseWindow::trailing(self.options.entity_lookback),
            include_compilations: self.options.include_compilations,
            ids: interests
                .iter()
                .map(|interest| (interest.slug.clone(), interest.id))
                .collect(),
        }
    }
}

fn collect_branch(
    username: &str,
    branch: Branch,
    keys: &[String],
    outcome: BulkOutcome<Collection, Arc<CatalogError>>,
    failed: &mut Vec<EntityKind>,
) -> Vec<Book> {
    let BulkOutcome { mut entries, error } = outcome;
    if let Some(err) = error {
        error!(
            target = "bookfeed::application::releases",
            user = username,
            branch = %branch.kind(),
            recovered = entries.len(),
            error = %err,
            "failed to fetch releases for user interests"
        );
        failed.push(branch.kind());
    }

    keys.iter()
        .filter_map(|key| entries.remove(key))
        .filter(|collection| collection.found)
        .flat_map(|collection| collection.books)
        .collect()
}

/// Concatenate book groups keeping the first occurrence of every book id.
pub fn merge_books<I>(groups: I) -> Vec<Book>
where
    I: IntoIterator<Item = Vec<Book>>,
{
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .flatten()
        .filter(|book| seen.insert(book.id))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Author,
    Series,
}

impl Branch {
    fn kind(self) -> EntityKind {
        match self {
            Branch::Author => EntityKind::Author,
            Branch::Series => EntityKind::Series,
        }
    }

    fn key(self, slug: &str) -> String {
        match self {
            Branch::Author => author_key(slug),
            Branch::Series => series_key(slug),
        }
    }

    fn collection_slug(self, slug: &str) -> String {
        match self {
            Branch::Author => format!("authors/{slug}"),
            Branch::Series => format!("series/{slug}"),
        }
    }
}

struct RecentLoader<'a> {
    catalog: &'a dyn CatalogClient,
    lookback: Duration,
}

#[async_trait]
impl Loader<Collection> for RecentLoader<'_> {
    type Error = CatalogError;

    async fn load(&self, _key: &str) -> Result<Collection, CatalogError> {
        let window = ReleaseWindow::trailing(self.lookback);
        let started = Instant::now();
        info!(
            target = "bookfeed::application::releases",
            since = %window.since,
            "fetching recent releases"
        );
        let books = self.catalog.fetch_recent(window).await?;
        info!(
            target = "bookfeed::application::releases",
            books = books.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieved recent releases"
        );
        Ok(Collection::new(RECENT_NAME, RECENT_SLUG, map_books(books)))
    }
}

/// One upstream entity (author or series) with its books in the window.
struct FetchedEntity {
    id: i64,
    slug: String,
    name: String,
    books: Vec<RawBook>,
}

struct ReleasesLoader<'a> {
    branch: Branch,
    catalog: &'a dyn CatalogClient,
    window: ReleaseWindow,
    include_compilations: bool,
    /// slug -> catalog id, from the user's interests; empty for direct requests
    ids: HashMap<String, i64>,
}

impl ReleasesLoader<'_> {
    /// Numeric ids for every slug, or `None` if any is unknown.
    fn ids_for(&self, slugs: &[String]) -> Option<Vec<i64>> {
        slugs
            .iter()
            .map(|slug| self.ids.get(slug).copied().filter(|id| *id != 0))
            .collect()
    }

    async fn fetch(&self, slugs: &[String]) -> Result<Vec<FetchedEntity>, CatalogError> {
        let window = self.window;
        let compilations = self.include_compilations;
        match (self.branch, self.ids_for(slugs)) {
            (Branch::Author, Some(ids)) => self
                .catalog
                .fetch_by_author_ids(window, &ids, compilations)
                .await
                .map(|raw| raw.authors.into_iter().map(FetchedEntity::from).collect()),
            (Branch::Author, None) => self
                .catalog
                .fetch_by_author_slugs(window, slugs, compilations)
                .await
                .map(|raw| raw.authors.into_iter().map(FetchedEntity::from).collect()),
            (Branch::Series, Some(ids)) => self
                .catalog
                .fetch_by_series_ids(window, &ids, compilations)
                .await
                .map(|raw| raw.series.into_iter().map(FetchedEntity::from).collect()),
            (Branch::Series, None) => self
                .catalog
                .fetch_by_series_slugs(window, slugs, compilations)
                .await
                .map(|raw| raw.series.into_iter().map(FetchedEntity::from).collect()),
        }
    }
}

impl From<crate::catalog::RawAuthor> for FetchedEntity {
    fn from(author: crate::catalog::RawAuthor) -> Self {
        Self {
            id: author.id,
            slug: author.slug,
            name: author.name,
            books: author.contributions.into_iter().map(|c| c.book).collect(),
        }
    }
}

impl From<crate::catalog::RawSeries> for FetchedEntity {
    fn from(series: crate::catalog::RawSeries) -> Self {
        Self {
            id: series.id,
            slug: series.slug,
            name: series.name,
            books: series.book_series.into_iter().map(|b| b.book).collect(),
        }
    }
}

#[async_trait]
impl BulkLoader<Collection> for ReleasesLoader<'_> {
    type Error = CatalogError;

    async fn bulk_load(&self, keys: &[String]) -> BulkOutcome<Collection, CatalogError> {
        let slugs: Vec<String> = keys.iter().map(|key| slug_from_key(key).to_string()).collect();
        let started = Instant::now();
        info!(
            target = "bookfeed::application::releases",
            branch = %self.branch.kind(),
            slugs = ?slugs,
            "fetching releases"
        );

        let fetched = match self.fetch(&slugs).await {
            Ok(fetched) => fetched,
            Err(err) => return BulkOutcome::partial(HashMap::new(), err),
        };
        info!(
            target = "bookfeed::application::releases",
            branch = %self.branch.kind(),
            found = fetched.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieved releases"
        );

        let slug_by_id: HashMap<i64, &str> = self
            .ids
            .iter()
            .filter(|(_, id)| **id != 0)
            .map(|(slug, id)| (*id, slug.as_str()))
            .collect();
        let requested: HashSet<&str> = slugs.iter().map(String::as_str).collect();

        let mut entries = HashMap::with_capacity(keys.len());
        for entity in fetched {
            // Match on the requested slug, falling back to the id the user interest carried.
            let slug = if requested.contains(entity.slug.as_str()) {
                entity.slug.as_str()
            } else {
                match slug_by_id.get(&entity.id) {
                    Some(slug) if requested.contains(slug) => *slug,
                    _ => continue,
                }
            };
            let collection = Collection::new(
                entity.name,
                self.branch.collection_slug(slug),
                map_books(entity.books),
            );
            entries.insert(self.branch.key(slug), collection);
        }

        for slug in &slugs {
            let key = self.branch.key(slug);
            entries
                .entry(key)
                .or_insert_with(|| Collection::not_found(self.branch.collection_slug(slug)));
        }

        BulkOutcome::complete(entries)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::{Image, Series};

    fn book(id: i64, title: &str) -> Book {
        Book {
            id,
            slug: format!("book-{id}"),
            title: title.to_string(),
            link: format!("https://hardcover.app/books/book-{id}"),
            release_date: OffsetDateTime::UNIX_EPOCH,
            compilation: false,
            headline: String::new(),
            description: String::new(),
            genres: Vec::new(),
            authors: Vec::new(),
            image: Image::default(),
            series: Series::default(),
        }
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let merged = merge_books([
            vec![book(1, "from series")],
            vec![book(1, "from author"), book(2, "only author")],
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].title, "from series");
        assert_eq!(merged[1].id, 2);
    }

    #[test]
    fn filter_parsing() {
        assert_eq!("".parse::<ReleaseFilter>().ok(), Some(ReleaseFilter::All));
        assert_eq!("Author".parse::<ReleaseFilter>().ok(), Some(ReleaseFilter::Author));
        assert_eq!("series".parse::<ReleaseFilter>().ok(), Some(ReleaseFilter::Series));
        assert!(matches!(
            "genre".parse::<ReleaseFilter>(),
            Err(ReleaseError::InvalidFilter(value)) if value == "genre"
        ));
    }

    #[test]
    fn filter_selects_branches() {
        assert!(ReleaseFilter::All.includes_authors() && ReleaseFilter::All.includes_series());
        assert!(!ReleaseFilter::Author.includes_series());
        assert!(!ReleaseFilter::Series.includes_authors());
    }

    #[test]
    fn branch_keys_and_slugs() {
        assert_eq!(Branch::Author.key("x"), "hardcover/author/x");
        assert_eq!(Branch::Series.collection_slug("x"), "series/x");
    }
}
