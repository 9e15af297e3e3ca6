//! Per-user reading interests derived from library history.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Instant,
};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::{
    cache::{InterestCache, Loader, user_key},
    catalog::{CatalogClient, CatalogError, types::RawBookRef},
    domain::{Interest, UserInterests, slug::slug_from_key},
};

/// Books a user must have by an author (or in a series) before it counts.
pub const MIN_BOOKS_FOR_INTEREST: usize = 2;

/// Resolves and caches the authors and series a user reads repeatedly.
pub struct InterestResolver {
    catalog: Arc<dyn CatalogClient>,
    cache: Arc<InterestCache>,
    lookback: Duration,
}

impl InterestResolver {
    pub fn new(catalog: Arc<dyn CatalogClient>, cache: Arc<InterestCache>, lookback: Duration) -> Self {
        Self {
            catalog,
            cache,
            lookback,
        }
    }

    /// Interests of `username`, loading the library on a cache miss.
    ///
    /// Unknown users resolve to `found == false` and are cached as such.
    pub async fn resolve(&self, username: &str) -> Result<UserInterests, Arc<CatalogError>> {
        let loader = LibraryLoader {
            catalog: self.catalog.as_ref(),
            lookback: self.lookback,
        };
        self.cache.get(&user_key(username), &loader).await
    }
}

struct LibraryLoader<'a> {
    catalog: &'a dyn CatalogClient,
    lookback: Duration,
}

#[async_trait]
impl Loader<UserInterests> for LibraryLoader<'_> {
    type Error = CatalogError;

    async fn load(&self, key: &str) -> Result<UserInterests, CatalogError> {
        let username = slug_from_key(key);
        let since = (OffsetDateTime::now_utc() - self.lookback).date();
        let started = Instant::now();
        info!(
            target = "bookfeed::application::interests",
            user = username,
            "fetching user library"
        );

        let library = self.catalog.fetch_user_library(username, since).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !library.user_exists() {
            info!(
                target = "bookfeed::application::interests",
                user = username,
                elapsed_ms,
                "user not found"
            );
            return Ok(UserInterests::not_found());
        }

        let interests = derive_interests(&library.user_books);
        info!(
            target = "bookfeed::application::interests",
            user = username,
            elapsed_ms,
            library = library.user_books.len(),
            authors = interests.authors.len(),
            series = interests.series.len(),
            "derived user interests"
        );
        Ok(interests)
    }
}

/// Count authors and featured series across `library` and keep the repeat ones.
///
/// Only contributors credited as `author` (or with no role) count; editors,
/// narrators and illustrators do not. An author credited twice on the same
/// book still counts once for that book.
pub fn derive_interests(library: &[RawBookRef]) -> UserInterests {
    let mut authors = Tally::default();
    let mut series = Tally::default();

    for entry in library {
        let book = &entry.book;
        let mut credited = HashSet::new();
        for contribution in &book.contributions {
            let author = &contribution.author;
            if author.slug.is_empty() || !is_author_role(contribution.contribution.as_deref()) {
                continue;
            }
            if credited.insert(author.slug.as_str()) {
                authors.record(&author.slug, author.id);
            }
        }

        if let Some(featured) = book
            .featured_series
            .as_ref()
            .and_then(|featured| featured.series.as_ref())
            .filter(|featured| !featured.slug.is_empty())
        {
            series.record(&featured.slug, featured.id);
        }
    }

    UserInterests::new(
        authors.qualifying(MIN_BOOKS_FOR_INTEREST),
        series.qualifying(MIN_BOOKS_FOR_INTEREST),
    )
}

fn is_author_role(role: Option<&str>) -> bool {
    match role.map(str::trim) {
        None | Some("") => true,
        Some(role) => role.eq_ignore_ascii_case("author"),
    }
}

#[derive(Default)]
struct Tally {
    // slug -> (id, count); BTreeMap keeps the output sorted by slug
    counts: BTreeMap<String, (i64, usize)>,
}

impl Tally {
    fn record(&mut self, slug: &str, id: i64) {
        let entry = self.counts.entry(slug.to_string()).or_insert((id, 0));
        if entry.0 == 0 {
            entry.0 = id;
        }
        entry.1 += 1;
    }

    fn qualifying(self, threshold: usize) -> Vec<Interest> {
        self.counts
            .into_iter()
            .filter(|(_, (_, count))| *count >= threshold)
            .map(|(slug, (id, _))| Interest::new(slug, id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use time::Date;

    use super::*;
    use crate::{
        cache::{ExpiryPolicy, LoadingCache},
        catalog::{
            RawAuthorReleases, RawBook, RawSeriesReleases, RawUserBooks, ReleaseWindow,
            types::{RawAuthorRef, RawContribution, RawFeaturedSeries, RawSeriesRef, RawUser},
        },
    };

    fn book(id: i64, authors: &[(&str, Option<&str>)], series: Option<&str>) -> RawBookRef {
        RawBookRef {
            book: RawBook {
                id,
                contributions: authors
                    .iter()
                    .enumerate()
                    .map(|(idx, (slug, role))| RawContribution {
                        contribution: role.map(str::to_string),
                        author: RawAuthorRef {
                            id: idx as i64 + 100,
                            name: slug.to_string(),
                            slug: slug.to_string(),
                        },
                    })
                    .collect(),
                featured_series: series.map(|slug| RawFeaturedSeries {
                    position: Some(1.0),
                    series: Some(RawSeriesRef {
                        id: 900,
                        name: slug.to_string(),
                        slug: slug.to_string(),
                    }),
                }),
                ..Default::default()
            },
        }
    }

    #[test]
    fn single_read_is_not_an_interest() {
        let library = vec![
            book(1, &[("one-off", None)], None),
            book(2, &[("regular", None)], None),
            book(3, &[("regular", Some("Author"))], None),
            book(4, &[("regular", Some("author"))], None),
        ];

        let interests = derive_interests(&library);

        assert_eq!(
            interests.authors,
            vec![Interest::new("regular", 100)]
        );
        assert!(interests.series.is_empty());
        assert!(interests.found);
    }

    #[test]
    fn non_author_roles_are_ignored() {
        let library = vec![
            book(1, &[("writer", None), ("narrator", Some("Narrator"))], None),
            book(2, &[("writer", None), ("narrator", Some("Narrator"))], None),
        ];

        let interests = derive_interests(&library);

        let slugs: Vec<_> = interests.authors.iter().map(|i| i.slug.as_str()).collect();
        assert_eq!(slugs, vec!["writer"]);
    }

    #[test]
    fn featured_series_counts_and_output_is_sorted() {
        let library = vec![
            book(1, &[], Some("zeta")),
            book(2, &[], Some("zeta")),
            book(3, &[], Some("alpha")),
            book(4, &[], Some("alpha")),
            book(5, &[], Some("")),
            book(6, &[], Some("")),
        ];

        let interests = derive_interests(&library);

        let slugs: Vec<_> = interests.series.iter().map(|i| i.slug.as_str()).collect();
        assert_eq!(slugs, vec!["alpha", "zeta"]);
        assert!(interests.series.iter().all(|i| i.id == 900));
    }

    #[test]
    fn duplicate_credit_on_one_book_counts_once() {
        let library = vec![book(1, &[("dup", None), ("dup", Some("author"))], None)];
        assert!(derive_interests(&library).authors.is_empty());
    }

    struct LibraryStub {
        calls: AtomicUsize,
        library: RawUserBooks,
    }

    #[async_trait]
    impl CatalogClient for LibraryStub {
        async fn fetch_recent(&self, _: ReleaseWindow) -> Result<Vec<RawBook>, CatalogError> {
            unreachable!("not used")
        }

        async fn fetch_by_author_slugs(
            &self,
            _: ReleaseWindow,
            _: &[String],
            _: bool,
        ) -> Result<RawAuthorReleases, CatalogError> {
            unreachable!("not used")
        }

        async fn fetch_by_author_ids(
            &self,
            _: ReleaseWindow,
            _: &[i64],
            _: bool,
        ) -> Result<RawAuthorReleases, CatalogError> {
            unreachable!("not used")
        }

        async fn fetch_by_series_slugs(
            &self,
            _: ReleaseWindow,
            _: &[String],
            _: bool,
        ) -> Result<RawSeriesReleases, CatalogError> {
            unreachable!("not used")
        }

        async fn fetch_by_series_ids(
            &self,
            _: ReleaseWindow,
            _: &[i64],
            _: bool,
        ) -> Result<RawSeriesReleases, CatalogError> {
            unreachable!("not used")
        }

        async fn fetch_user_library(
            &self,
            _: &str,
            _: Date,
        ) -> Result<RawUserBooks, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.library.clone())
        }
    }

    fn resolver(library: RawUserBooks) -> (InterestResolver, Arc<LibraryStub>) {
        let stub = Arc::new(LibraryStub {
            calls: AtomicUsize::new(0),
            library,
        });
        let cache = Arc::new(LoadingCache::new(
            "user",
            100,
            ExpiryPolicy::new(
                std::time::Duration::from_secs(3600),
                std::time::Duration::from_secs(600),
            ),
        ));
        (
            InterestResolver::new(stub.clone(), cache, Duration::days(730)),
            stub,
        )
    }

    #[tokio::test]
    async fn unknown_user_is_cached_as_not_found() {
        let (resolver, stub) = resolver(RawUserBooks::default());

        let first = resolver.resolve("ghost").await.expect("resolved");
        let second = resolver.resolve("ghost").await.expect("cached");

        assert!(!first.found);
        assert_eq!(first, second);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn known_user_without_repeats_has_empty_interests() {
        let (resolver, _) = resolver(RawUserBooks {
            users: vec![RawUser {
                id: 1,
                username: "reader".into(),
            }],
            user_books: vec![book(1, &[("once", None)], None)],
        });

        let interests = resolver.resolve("reader").await.expect("resolved");

        assert!(interests.found);
        assert!(interests.is_empty());
    }
}
