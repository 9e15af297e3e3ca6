use std::{error::Error as StdError, sync::Arc};

use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    application::releases::{ReleaseAggregator, ReleaseError, ReleaseFilter},
    domain::{Book, Collection, Interest},
};

/// Items kept per feed after sorting by release date.
pub const MAX_FEED_ITEMS: usize = 25;

const SITE_URL: &str = "https://hardcover.app/";
const ENCLOSURE_MIME: &str = "image/webp";

#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub created: OffsetDateTime,
    pub updated: OffsetDateTime,
    pub items: Vec<FeedItem>,
    /// Set when part of the upstream data could not be fetched.
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub content: String,
    pub created: OffsetDateTime,
    pub enclosure: Option<Enclosure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: &'static str,
}

#[derive(Debug, Error)]
#[error("failed to render content for book {book_id}")]
pub struct RenderError {
    pub book_id: i64,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl RenderError {
    pub fn new(book_id: i64, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            book_id,
            source: source.into(),
        }
    }
}

/// Renders the HTML body of a single feed item.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, book: &Book) -> Result<String, RenderError>;
}

#[derive(Clone)]
pub struct FeedAssembler {
    renderer: Arc<dyn ContentRenderer>,
}

impl FeedAssembler {
    pub fn new(renderer: Arc<dyn ContentRenderer>) -> Self {
        Self { renderer }
    }

    /// Newest [`MAX_FEED_ITEMS`] books as a feed.
    ///
    /// A book whose content fails to render is logged and left out.
    pub fn assemble(
        &self,
        title: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        created: OffsetDateTime,
        mut books: Vec<Book>,
    ) -> Feed {
        books.sort_by(|a, b| b.release_date.cmp(&a.release_date));
        books.truncate(MAX_FEED_ITEMS);

        let items = books
            .iter()
            .filter_map(|book| match self.renderer.render(book) {
                Ok(content) => Some(feed_item(book, content)),
                Err(err) => {
                    warn!(
                        target = "bookfeed::application::feed",
                        book_id = err.book_id,
                        error = %err,
                        "skipping book with unrenderable content"
                    );
                    None
                }
            })
            .collect();

        Feed {
            title: title.into(),
            link: link.into(),
            description: description.into(),
            created,
            updated: created,
            items,
            partial: false,
        }
    }
}

fn feed_item(book: &Book, content: String) -> FeedItem {
    let enclosure = (!book.image.url.is_empty()).then(|| Enclosure {
        url: book.image.url.clone(),
        mime_type: ENCLOSURE_MIME,
    });

    FeedItem {
        id: book.id.to_string(),
        title: book.title.clone(),
        link: book.link.clone(),
        author: book.primary_author().map(str::to_string),
        content,
        created: book.release_date,
        enclosure,
    }
}

/// Release collections turned into titled feeds.
#[derive(Clone)]
pub struct FeedService {
    releases: Arc<ReleaseAggregator>,
    assembler: FeedAssembler,
}

impl FeedService {
    pub fn new(releases: Arc<ReleaseAggregator>, assembler: FeedAssembler) -> Self {
        Self {
            releases,
            assembler,
        }
    }

    pub async fn recent_feed(&self) -> Result<Feed, ReleaseError> {
        let collection = self.releases.recent_releases().await?;
        Ok(self.collection_feed("Hardcover: Recent Releases".to_string(), String::new(), collection))
    }

    pub async fn author_feed(&self, slug: &str) -> Result<Feed, ReleaseError> {
        let collection = self.releases.author_releases(slug).await?;
        let title = format!("Hardcover Author Releases: {}", collection.name);
        Ok(self.collection_feed(title, String::new(), collection))
    }

    pub async fn series_feed(&self, slug: &str) -> Result<Feed, ReleaseError> {
        let collection = self.releases.series_releases(slug).await?;
        let title = format!("Hardcover Series Releases: {}", collection.name);
        Ok(self.collection_feed(title, String::new(), collection))
    }

    pub async fn user_feed(&self, username: &str, filter: ReleaseFilter) -> Result<Feed, ReleaseError> {
        let releases = self.releases.user_releases(username, filter).await?;
        let description =
            user_description(&releases.interests.series, &releases.interests.authors);
        let partial = releases.is_partial();
        let title = format!("Hardcover User Releases: {username}");
        let mut feed = self.collection_feed(title, description, releases.collection);
        feed.partial = partial;
        Ok(feed)
    }

    fn collection_feed(&self, title: String, description: String, collection: Collection) -> Feed {
        let link = format!("{SITE_URL}{}", collection.slug);
        let feed = self.assembler.assemble(
            title,
            link,
            description,
            collection.created,
            collection.books,
        );
        info!(
            target = "bookfeed::application::feed",
            collection = %collection.slug,
            entries = feed.items.len(),
            "assembled feed"
        );
        feed
    }
}

/// Human-readable summary of which interests a user feed covers.
pub fn user_description(series: &[Interest], authors: &[Interest]) -> String {
    let mut description = String::from("Includes New Releases from:\n");
    if !series.is_empty() {
        description.push_str("Series: ");
        description.push_str(&join_slugs(series));
        description.push('\n');
    }
    if !authors.is_empty() {
        description.push_str("Authors: ");
        description.push_str(&join_slugs(authors));
        description.push('\n');
    }
    description
}

fn join_slugs(interests: &[Interest]) -> String {
    interests
        .iter()
        .map(|interest| interest.slug.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
