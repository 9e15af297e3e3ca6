//! Raw catalog entities to domain books.
//!
//! Pure and I/O free. Cover images with known dimensions are rescaled to a
//! fixed height and routed through Hardcover's image CDN.

use time::{Date, OffsetDateTime, Time, format_description::BorrowedFormatItem, macros::format_description};
use url::Url;

use crate::{
    catalog::types::{RawBook, RawImage},
    domain::{Book, Image, Series},
};

const BOOK_BASE_URL: &str = "https://hardcover.app/books/";
const IMAGE_CDN_URL: &str = "https://img.hardcover.app/enlarge";
const COVER_HEIGHT: u32 = 500;
const RELEASE_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

pub fn map_book(raw: RawBook) -> Book {
    let slug = raw.slug.unwrap_or_default();
    let genres = raw.genres.into_iter().map(|genre| genre.tag).collect();
    let authors = raw
        .contributions
        .into_iter()
        .map(|contribution| contribution.author.name)
        .collect();
    let series = raw
        .featured_series
        .map(|featured| Series {
            title: featured
                .series
                .map(|series| series.name)
                .unwrap_or_default(),
            position: featured.position.unwrap_or_default(),
        })
        .unwrap_or_default();

    Book {
        id: raw.id,
        link: format!("{BOOK_BASE_URL}{slug}"),
        slug,
        title: raw.title.unwrap_or_default(),
        release_date: parse_release_date(raw.release_date.as_deref()),
        compilation: raw.compilation.unwrap_or(false),
        headline: raw.headline.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        genres,
        authors,
        image: map_image(raw.image.unwrap_or_default()),
        series,
    }
}

pub fn map_books(raw: Vec<RawBook>) -> Vec<Book> {
    raw.into_iter().map(map_book).collect()
}

/// Scale to a 500px-high cover and rewrite the URL through the CDN.
///
/// Images missing either dimension pass through untouched.
pub fn map_image(raw: RawImage) -> Image {
    let image = Image {
        url: raw.url.unwrap_or_default(),
        width: raw.width.unwrap_or(0),
        height: raw.height.unwrap_or(0),
    };
    if !image.has_dimensions() {
        return image;
    }

    let ratio = image.width as f32 / image.height as f32;
    let width = (COVER_HEIGHT as f32 * ratio) as u32;
    let url = cdn_url(&image.url, width, COVER_HEIGHT);
    Image {
        url,
        width,
        height: COVER_HEIGHT,
    }
}

pub fn cdn_url(source: &str, width: u32, height: u32) -> String {
    let width = width.to_string();
    let height = height.to_string();
    match Url::parse_with_params(
        IMAGE_CDN_URL,
        &[
            ("url", source),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("type", "webp"),
        ],
    ) {
        Ok(url) => url.into(),
        Err(_) => source.to_string(),
    }
}

/// `YYYY-MM-DD` at midnight UTC; anything else maps to the Unix epoch.
pub fn parse_release_date(value: Option<&str>) -> OffsetDateTime {
    value
        .and_then(|raw| Date::parse(raw.get(..10).unwrap_or(raw), RELEASE_DATE_FORMAT).ok())
        .map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
