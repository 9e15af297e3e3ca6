#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::Date;

use bookfeed::application::feed::{FeedAssembler, FeedService};
use bookfeed::application::releases::{ReleaseAggregator, ReleaseOptions};
use bookfeed::cache::{CacheConfig, collection_cache, interest_cache};
use bookfeed::catalog::types::{
    RawAuthorRef, RawBookRef, RawContribution, RawFeaturedSeries, RawSeriesRef, RawUser,
};
use bookfeed::catalog::{
    CatalogClient, CatalogError, RawAuthor, RawAuthorReleases, RawBook, RawSeries,
    RawSeriesReleases, RawUserBooks, ReleaseWindow,
};
use bookfeed::presentation::views::TemplateContentRenderer;

/// In-memory catalog that counts every call it serves.
#[derive(Default)]
pub struct FakeCatalog {
    pub recent: Vec<RawBook>,
    pub authors: Vec<RawAuthor>,
    pub series: Vec<RawSeries>,
    pub libraries: HashMap<String, Vec<RawBookRef>>,
    pub recent_delay: Duration,
    pub entity_delay: Duration,
    pub fail_authors: AtomicBool,
    pub fail_series: AtomicBool,
    pub recent_calls: AtomicUsize,
    pub author_id_calls: AtomicUsize,
    pub author_slug_calls: AtomicUsize,
    pub series_id_calls: AtomicUsize,
    pub series_slug_calls: AtomicUsize,
    pub library_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn recent_calls(&self) -> usize {
        self.recent_calls.load(Ordering::SeqCst)
    }

    pub fn author_id_calls(&self) -> usize {
        self.author_id_calls.load(Ordering::SeqCst)
    }

    pub fn author_slug_calls(&self) -> usize {
        self.author_slug_calls.load(Ordering::SeqCst)
    }

    pub fn series_id_calls(&self) -> usize {
        self.series_id_calls.load(Ordering::SeqCst)
    }

    pub fn series_slug_calls(&self) -> usize {
        self.series_slug_calls.load(Ordering::SeqCst)
    }

    /// Author queries of either kind.
    pub fn author_calls(&self) -> usize {
        self.author_id_calls() + self.author_slug_calls()
    }

    /// Series queries of either kind.
    pub fn series_calls(&self) -> usize {
        self.series_id_calls() + self.series_slug_calls()
    }

    pub fn library_calls(&self) -> usize {
        self.library_calls.load(Ordering::SeqCst)
    }

    fn unavailable() -> CatalogError {
        CatalogError::Status {
            status: 503,
            body: "upstream down".to_string(),
        }
    }

    async fn authors_where(
        &self,
        calls: &AtomicUsize,
        keep: impl Fn(&RawAuthor) -> bool,
    ) -> Result<RawAuthorReleases, CatalogError> {
        calls.fetch_add(1, Ordering::SeqCst);
        if !self.entity_delay.is_zero() {
            tokio::time::sleep(self.entity_delay).await;
        }
        if self.fail_authors.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(RawAuthorReleases {
            authors: self.authors.iter().filter(|a| keep(a)).cloned().collect(),
        })
    }

    async fn series_where(
        &self,
        calls: &AtomicUsize,
        keep: impl Fn(&RawSeries) -> bool,
    ) -> Result<RawSeriesReleases, CatalogError> {
        calls.fetch_add(1, Ordering::SeqCst);
        if !self.entity_delay.is_zero() {
            tokio::time::sleep(self.entity_delay).await;
        }
        if self.fail_series.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(RawSeriesReleases {
            series: self.series.iter().filter(|s| keep(s)).cloned().collect(),
        })
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn fetch_recent(&self, _window: ReleaseWindow) -> Result<Vec<RawBook>, CatalogError> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        if !self.recent_delay.is_zero() {
            tokio::time::sleep(self.recent_delay).await;
        }
        Ok(self.recent.clone())
    }

    async fn fetch_by_author_slugs(
        &self,
        _window: ReleaseWindow,
        slugs: &[String],
        _include_compilations: bool,
    ) -> Result<RawAuthorReleases, CatalogError> {
        self.authors_where(&self.author_slug_calls, |author| slugs.contains(&author.slug))
            .await
    }

    async fn fetch_by_author_ids(
        &self,
        _window: ReleaseWindow,
        ids: &[i64],
        _include_compilations: bool,
    ) -> Result<RawAuthorReleases, CatalogError> {
        self.authors_where(&self.author_id_calls, |author| ids.contains(&author.id))
            .await
    }

    async fn fetch_by_series_slugs(
        &self,
        _window: ReleaseWindow,
        slugs: &[String],
        _include_compilations: bool,
    ) -> Result<RawSeriesReleases, CatalogError> {
        self.series_where(&self.series_slug_calls, |series| slugs.contains(&series.slug))
            .await
    }

    async fn fetch_by_series_ids(
        &self,
        _window: ReleaseWindow,
        ids: &[i64],
        _include_compilations: bool,
    ) -> Result<RawSeriesReleases, CatalogError> {
        self.series_where(&self.series_id_calls, |series| ids.contains(&series.id))
            .await
    }

    async fn fetch_user_library(
        &self,
        username: &str,
        _since: Date,
    ) -> Result<RawUserBooks, CatalogError> {
        self.library_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.libraries.get(username) {
            Some(books) => RawUserBooks {
                users: vec![RawUser {
                    id: 1,
                    username: username.to_string(),
                }],
                user_books: books.clone(),
            },
            None => RawUserBooks::default(),
        })
    }
}

pub fn book(id: i64, title: &str, release_date: &str) -> RawBook {
    RawBook {
        id,
        slug: Some(format!("book-{id}")),
        title: Some(title.to_string()),
        release_date: Some(release_date.to_string()),
        ..Default::default()
    }
}

pub fn by_author(mut book: RawBook, id: i64, slug: &str, name: &str) -> RawBook {
    book.contributions.push(RawContribution {
        contribution: None,
        author: RawAuthorRef {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
        },
    });
    book
}

pub fn in_series(mut book: RawBook, id: i64, slug: &str, name: &str, position: f32) -> RawBook {
    book.featured_series = Some(RawFeaturedSeries {
        position: Some(position),
        series: Some(RawSeriesRef {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
        }),
    });
    book
}

pub fn author(id: i64, slug: &str, name: &str, books: Vec<RawBook>) -> RawAuthor {
    RawAuthor {
        id,
        name: name.to_string(),
        slug: slug.to_string(),
        contributions: books.into_iter().map(|book| RawBookRef { book }).collect(),
    }
}

pub fn series(id: i64, slug: &str, name: &str, books: Vec<RawBook>) -> RawSeries {
    RawSeries {
        id,
        name: name.to_string(),
        slug: slug.to_string(),
        book_series: books.into_iter().map(|book| RawBookRef { book }).collect(),
    }
}

pub fn library(books: Vec<RawBook>) -> Vec<RawBookRef> {
    books.into_iter().map(|book| RawBookRef { book }).collect()
}

/// Catalog with one reader (`reader`) who reads N. K. Jemisin and The Broken Earth.
pub fn seeded_catalog() -> FakeCatalog {
    let first = in_series(
        by_author(book(1, "The Fifth Season", "2015-08-04"), 7, "n-k-jemisin", "N. K. Jemisin"),
        9,
        "the-broken-earth",
        "The Broken Earth",
        1.0,
    );
    let second = in_series(
        by_author(book(2, "The Obelisk Gate", "2016-08-16"), 7, "n-k-jemisin", "N. K. Jemisin"),
        9,
        "the-broken-earth",
        "The Broken Earth",
        2.0,
    );
    let upcoming_series = in_series(
        by_author(book(3, "The Stone Sky", "2017-08-15"), 7, "n-k-jemisin", "N. K. Jemisin"),
        9,
        "the-broken-earth",
        "The Broken Earth",
        3.0,
    );
    let mut upcoming_author = upcoming_series.clone();
    upcoming_author.title = Some("The Stone Sky (author listing)".to_string());
    let standalone = by_author(book(4, "The City We Became", "2020-03-24"), 7, "n-k-jemisin", "N. K. Jemisin");

    let mut libraries = HashMap::new();
    libraries.insert("reader".to_string(), library(vec![first, second]));
    libraries.insert(
        "newcomer".to_string(),
        library(vec![by_author(book(5, "Piranesi", "2020-09-15"), 11, "susanna-clarke", "Susanna Clarke")]),
    );

    FakeCatalog {
        recent: vec![
            by_author(book(10, "Fresh Release", "2024-05-01"), 12, "someone", "Someone"),
            by_author(book(11, "Older Release", "2024-04-01"), 12, "someone", "Someone"),
        ],
        authors: vec![author(7, "n-k-jemisin", "N. K. Jemisin", vec![upcoming_author, standalone])],
        series: vec![series(9, "the-broken-earth", "The Broken Earth", vec![upcoming_series])],
        libraries,
        ..Default::default()
    }
}

pub fn aggregator(catalog: Arc<FakeCatalog>) -> ReleaseAggregator {
    let config = CacheConfig::default();
    ReleaseAggregator::new(
        catalog,
        Arc::new(collection_cache(&config)),
        Arc::new(interest_cache(&config)),
        ReleaseOptions::default(),
    )
}

pub fn feed_service(catalog: Arc<FakeCatalog>) -> FeedService {
    FeedService::new(
        Arc::new(aggregator(catalog)),
        FeedAssembler::new(Arc::new(TemplateContentRenderer)),
    )
}
