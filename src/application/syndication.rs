//! Feed encoders for RSS 2.0, Atom 1.0 and JSON Feed 1.1.
//!
//! Encoding is pure: a [`Feed`] goes in, a document string comes out. The
//! HTTP layer picks the format from the request path and sets the matching
//! content type.

use serde::Serialize;
use thiserror::Error;
use time::{
    OffsetDateTime,
    format_description::well_known::{Rfc2822, Rfc3339},
};

use crate::application::feed::{Feed, FeedItem};

const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedFormat {
    #[default]
    Rss,
    Atom,
    Json,
}

impl FeedFormat {
    /// Format for a path extension, without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "rss" | "xml" => Some(FeedFormat::Rss),
            "atom" => Some(FeedFormat::Atom),
            "json" => Some(FeedFormat::Json),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            FeedFormat::Rss => "application/rss+xml; charset=utf-8",
            FeedFormat::Atom => "application/atom+xml; charset=utf-8",
            FeedFormat::Json => "application/json; charset=utf-8",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedFormat::Rss => "rss",
            FeedFormat::Atom => "atom",
            FeedFormat::Json => "json",
        }
    }
}

/// Split `name.ext` into the name and its feed format.
///
/// A segment without a recognised extension is returned whole with the
/// default format.
pub fn split_format(segment: &str) -> (&str, FeedFormat) {
    match segment.rsplit_once('.') {
        Some((name, extension)) => match FeedFormat::from_extension(extension) {
            Some(format) => (name, format),
            None => (segment, FeedFormat::default()),
        },
        None => (segment, FeedFormat::default()),
    }
}

#[derive(Debug, Error)]
pub enum SyndicationError {
    #[error("failed to encode JSON feed")]
    Json(#[from] serde_json::Error),
}

pub fn encode(feed: &Feed, format: FeedFormat) -> Result<String, SyndicationError> {
    match format {
        FeedFormat::Rss => Ok(rss(feed)),
        FeedFormat::Atom => Ok(atom(feed)),
        FeedFormat::Json => json_feed(feed),
    }
}

fn rss(feed: &Feed) -> String {
    let mut items = String::new();
    for item in &feed.items {
        items.push_str("    <item>\n");
        items.push_str(&format!("      <title>{}</title>\n", xml_escape(&item.title)));
        items.push_str(&format!("      <link>{}</link>\n", xml_escape(&item.link)));
        items.push_str(&format!(
            "      <guid isPermaLink=\"false\">{}</guid>\n",
            xml_escape(&item.id)
        ));
        items.push_str(&format!("      <pubDate>{}</pubDate>\n", rfc2822(item.created)));
        if let Some(author) = &item.author {
            items.push_str(&format!("      <dc:creator>{}</dc:creator>\n", xml_escape(author)));
        }
        items.push_str(&format!(
            "      <description>{}</description>\n",
            cdata(&item.content)
        ));
        if let Some(enclosure) = &item.enclosure {
            items.push_str(&format!(
                "      <enclosure url=\"{}\" length=\"0\" type=\"{}\"/>\n",
                xml_escape(&enclosure.url),
                enclosure.mime_type
            ));
        }
        items.push_str("    </item>\n");
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n    <lastBuildDate>{}</lastBuildDate>\n{}  </channel>\n</rss>\n",
        xml_escape(&feed.title),
        xml_escape(&feed.link),
        xml_escape(&feed.description),
        rfc2822(feed.updated),
        items
    )
}

fn atom(feed: &Feed) -> String {
    let mut entries = String::new();
    for item in &feed.items {
        entries.push_str("  <entry>\n");
        entries.push_str(&format!("    <title>{}</title>\n", xml_escape(&item.title)));
        entries.push_str(&format!("    <link href=\"{}\"/>\n", xml_escape(&item.link)));
        entries.push_str(&format!("    <id>{}</id>\n", entry_id(item)));
        entries.push_str(&format!("    <updated>{}</updated>\n", rfc3339(item.created)));
        if let Some(author) = &item.author {
            entries.push_str(&format!(
                "    <author>\n      <name>{}</name>\n    </author>\n",
                xml_escape(author)
            ));
        }
        entries.push_str(&format!(
            "    <content type=\"html\">{}</content>\n",
            cdata(&item.content)
        ));
        if let Some(enclosure) = &item.enclosure {
            entries.push_str(&format!(
                "    <link rel=\"enclosure\" type=\"{}\" href=\"{}\"/>\n",
                enclosure.mime_type,
                xml_escape(&enclosure.url)
            ));
        }
        entries.push_str("  </entry>\n");
    }

    let subtitle = if feed.description.is_empty() {
        String::new()
    } else {
        format!("  <subtitle>{}</subtitle>\n", xml_escape(&feed.description))
    };

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n  <title>{}</title>\n  <id>{}</id>\n  <updated>{}</updated>\n  <link href=\"{}\"/>\n{}{}</feed>\n",
        xml_escape(&feed.title),
        xml_escape(&feed.link),
        rfc3339(feed.updated),
        xml_escape(&feed.link),
        subtitle,
        entries
    )
}

fn entry_id(item: &FeedItem) -> String {
    if item.link.is_empty() {
        format!("urn:hardcover:book:{}", xml_escape(&item.id))
    } else {
        xml_escape(&item.link)
    }
}

#[derive(Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    items: Vec<JsonFeedItem<'a>>,
}

#[derive(Serialize)]
struct JsonFeedItem<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    content_html: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    date_published: OffsetDateTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<JsonFeedAuthor<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<JsonFeedAttachment<'a>>,
}

#[derive(Serialize)]
struct JsonFeedAuthor<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct JsonFeedAttachment<'a> {
    url: &'a str,
    mime_type: &'a str,
}

fn json_feed(feed: &Feed) -> Result<String, SyndicationError> {
    let document = JsonFeed {
        version: JSON_FEED_VERSION,
        title: &feed.title,
        home_page_url: &feed.link,
        description: &feed.description,
        items: feed
            .items
            .iter()
            .map(|item| JsonFeedItem {
                id: &item.id,
                url: &item.link,
                title: &item.title,
                content_html: &item.content,
                date_published: item.created,
                authors: item
                    .author
                    .iter()
                    .map(|name| JsonFeedAuthor { name })
                    .collect(),
                attachments: item
                    .enclosure
                    .iter()
                    .map(|enclosure| JsonFeedAttachment {
                        url: &enclosure.url,
                        mime_type: enclosure.mime_type,
                    })
                    .collect(),
            })
            .collect(),
    };
    Ok(serde_json::to_string(&document)?)
}

fn rfc2822(value: OffsetDateTime) -> String {
    value
        .format(&Rfc2822)
        .unwrap_or_else(|_| value.to_string())
}

fn rfc3339(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.to_string())
}

fn cdata(input: &str) -> String {
    format!("<![CDATA[{}]]>", input.replace("]]>", "]]]]><![CDATA[>"))
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use time::macros::datetime;

    use super::*;
    use crate::application::feed::Enclosure;

    fn sample_feed() -> Feed {
        let created = datetime!(2024-05-01 12:00 UTC);
        Feed {
            title: "Hardcover Author Releases: Tom & Jerry".into(),
            link: "https://hardcover.app/authors/tom-jerry".into(),
            description: String::new(),
            created,
            updated: created,
            items: vec![FeedItem {
                id: "42".into(),
                title: "Cats <and> Mice".into(),
                link: "https://hardcover.app/books/cats-and-mice".into(),
                author: Some("Tom".into()),
                content: "<p>chase ]]> scene</p>".into(),
                created: datetime!(2024-04-30 0:00 UTC),
                enclosure: Some(Enclosure {
                    url: "https://img.hardcover.app/enlarge?url=a&width=1".into(),
                    mime_type: "image/webp",
                }),
            }],
            partial: false,
        }
    }

    #[test]
    fn extension_selects_format() {
        assert_eq!(split_format("recent"), ("recent", FeedFormat::Rss));
        assert_eq!(split_format("recent.atom"), ("recent", FeedFormat::Atom));
        assert_eq!(split_format("brandon.JSON"), ("brandon", FeedFormat::Json));
        assert_eq!(split_format("mr.smith"), ("mr.smith", FeedFormat::Rss));
    }

    #[test]
    fn content_types_carry_charset() {
        assert_eq!(
            FeedFormat::Atom.content_type(),
            "application/atom+xml; charset=utf-8"
        );
        assert!(FeedFormat::Json.content_type().ends_with("charset=utf-8"));
    }

    #[test]
    fn rss_escapes_text_and_wraps_content() {
        let xml = encode(&sample_feed(), FeedFormat::Rss).expect("rss");

        assert!(xml.contains("<title>Hardcover Author Releases: Tom &amp; Jerry</title>"));
        assert!(xml.contains("<title>Cats &lt;and&gt; Mice</title>"));
        assert!(xml.contains("<pubDate>Tue, 30 Apr 2024 00:00:00 +0000</pubDate>"));
        assert!(xml.contains("<![CDATA[<p>chase ]]]]><![CDATA[> scene</p>]]>"));
        assert!(xml.contains("url=\"https://img.hardcover.app/enlarge?url=a&amp;width=1\""));
        assert!(xml.contains("<dc:creator>Tom</dc:creator>"));
    }

    #[test]
    fn atom_uses_rfc3339_and_html_content() {
        let xml = encode(&sample_feed(), FeedFormat::Atom).expect("atom");

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">"));
        assert!(xml.contains("<updated>2024-04-30T00:00:00Z</updated>"));
        assert!(xml.contains("<content type=\"html\"><![CDATA["));
        assert!(xml.contains("<link rel=\"enclosure\" type=\"image/webp\""));
        assert!(!xml.contains("<subtitle>"));
    }

    #[test]
    fn json_feed_follows_version_1_1() {
        let json = encode(&sample_feed(), FeedFormat::Json).expect("json");
        let value: Value = serde_json::from_str(&json).expect("valid json");

        assert_eq!(value["version"], JSON_FEED_VERSION);
        assert!(value.get("description").is_none());
        let item = &value["items"][0];
        assert_eq!(item["id"], "42");
        assert_eq!(item["date_published"], "2024-04-30T00:00:00Z");
        assert_eq!(item["authors"][0]["name"], "Tom");
        assert_eq!(item["attachments"][0]["mime_type"], "image/webp");
    }
}
