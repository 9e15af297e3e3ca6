//! Cache key construction.
//!
//! Keys are namespaced `hardcover/<kind>/<slug>` so the direct author and
//! series feeds share entries with the user aggregation path.

const NAMESPACE: &str = "hardcover";

/// Key of the single "recent releases" collection.
pub const RECENT_RELEASES_KEY: &str = "hardcover/releases";

/// Kind of entity a collection key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyKind {
    Author,
    Series,
    User,
}

impl KeyKind {
    fn as_str(self) -> &'static str {
        match self {
            KeyKind::Author => "author",
            KeyKind::Series => "series",
            KeyKind::User => "user",
        }
    }
}

fn entity_key(kind: KeyKind, slug: &str) -> String {
    format!("{NAMESPACE}/{}/{slug}", kind.as_str())
}

pub fn author_key(slug: &str) -> String {
    entity_key(KeyKind::Author, slug)
}

pub fn series_key(slug: &str) -> String {
    entity_key(KeyKind::Series, slug)
}

pub fn user_key(username: &str) -> String {
    entity_key(KeyKind::User, username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_kind() {
        assert_eq!(author_key("n-k-jemisin"), "hardcover/author/n-k-jemisin");
        assert_eq!(series_key("the-expanse"), "hardcover/series/the-expanse");
        assert_eq!(user_key("reader"), "hardcover/user/reader");
    }

    #[test]
    fn same_slug_different_kind_never_collides() {
        assert_ne!(author_key("dune"), series_key("dune"));
    }
}
