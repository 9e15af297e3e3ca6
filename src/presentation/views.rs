use askama::Template;
use time::{format_description::BorrowedFormatItem, macros::format_description};

use crate::{
    application::feed::{ContentRenderer, RenderError},
    domain::Book,
};

const RELEASE_DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

#[derive(Template)]
#[template(path = "feed/content.html")]
pub struct BookContentTemplate<'a> {
    pub book: &'a Book,
    pub release_date: String,
}

impl<'a> BookContentTemplate<'a> {
    pub fn new(book: &'a Book) -> Self {
        let release_date = book
            .release_date
            .format(RELEASE_DATE_FORMAT)
            .unwrap_or_else(|_| book.release_date.date().to_string());
        Self { book, release_date }
    }
}

/// [`ContentRenderer`] backed by the compiled askama item template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateContentRenderer;

impl ContentRenderer for TemplateContentRenderer {
    fn render(&self, book: &Book) -> Result<String, RenderError> {
        BookContentTemplate::new(book)
            .render()
            .map_err(|err| RenderError::new(book.id, err))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::{Image, Series};

    fn book() -> Book {
        Book {
            id: 1,
            slug: "wind-and-truth".into(),
            title: "Wind & Truth".into(),
            link: "https://hardcover.app/books/wind-and-truth".into(),
            release_date: datetime!(2024-12-06 0:00 UTC),
            compilation: false,
            headline: String::new(),
            description: "Dalinar <finally> faces Odium.".into(),
            genres: vec!["Fantasy".into(), "Epic".into()],
            authors: vec!["Brandon Sanderson".into()],
            image: Image {
                url: "https://img.hardcover.app/enlarge?url=x&width=333&height=500&type=webp".into(),
                width: 333,
                height: 500,
            },
            series: Series {
                title: "The Stormlight Archive".into(),
                position: 5.0,
            },
        }
    }

    #[test]
    fn renders_escaped_book_details() {
        let html = TemplateContentRenderer.render(&book()).expect("rendered");

        assert!(html.contains("width=\"333\" height=\"500\""));
        assert!(!html.contains("Wind & Truth"));
        assert!(html.contains("Release date: December 6, 2024"));
        assert!(html.contains("Series: The Stormlight Archive #5"));
        assert!(html.contains("Genres: Fantasy, Epic"));
        assert!(html.contains("Dalinar &"));
        assert!(!html.contains("<finally>"));
        assert!(!html.contains("<strong>"));
    }

    #[test]
    fn cover_is_omitted_without_url() {
        let mut book = book();
        book.image = Image::default();

        let html = TemplateContentRenderer.render(&book).expect("rendered");

        assert!(!html.contains("<img"));
    }
}
