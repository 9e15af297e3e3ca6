//! GraphQL documents sent to Hardcover.

macro_rules! book_fields {
    () => {
        "fragment BookFields on books {
  id
  slug
  title
  release_date
  compilation
  headline
  description
  genres: cached_tags(path: \"Genre\")
  image: cached_image
  contributions { contribution author { id name slug } }
  featured_series: featured_book_series { position series { id name slug } }
}
"
    };
}

macro_rules! release_filter {
    () => {
        "release_date: {_gte: $since, _lte: $until}, compilation: {_in: $compilations}"
    };
}

pub(super) const RECENT_RELEASES: &str = concat!(
    book_fields!(),
    "query RecentReleases($since: date!, $until: date!) {
  books(
    where: {release_date: {_gte: $since, _lte: $until}, users_count: {_gt: 0}}
    order_by: {users_count: desc}
    limit: 100
  ) { ...BookFields }
}"
);

pub(super) const AUTHOR_RELEASES_BY_SLUG: &str = concat!(
    book_fields!(),
    "query AuthorReleasesBySlug($since: date!, $until: date!, $slugs: [String!]!, $compilations: [Boolean!]!) {
  authors(where: {slug: {_in: $slugs}}) {
    id
    name
    slug
    contributions(where: {contributable_type: {_eq: \"Book\"}, book: {",
    release_filter!(),
    "}}) { book { ...BookFields } }
  }
}"
);

pub(super) const AUTHOR_RELEASES_BY_ID: &str = concat!(
    book_fields!(),
    "query AuthorReleasesById($since: date!, $until: date!, $ids: [Int!]!, $compilations: [Boolean!]!) {
  authors(where: {id: {_in: $ids}}) {
    id
    name
    slug
    contributions(where: {contributable_type: {_eq: \"Book\"}, book: {",
    release_filter!(),
    "}}) { book { ...BookFields } }
  }
}"
);

pub(super) const SERIES_RELEASES_BY_SLUG: &str = concat!(
    book_fields!(),
    "query SeriesReleasesBySlug($since: date!, $until: date!, $slugs: [String!]!, $compilations: [Boolean!]!) {
  series(where: {slug: {_in: $slugs}}) {
    id
    name
    slug
    book_series(where: {book: {",
    release_filter!(),
    "}}) { book { ...BookFields } }
  }
}"
);

pub(super) const SERIES_RELEASES_BY_ID: &str = concat!(
    book_fields!(),
    "query SeriesReleasesById($since: date!, $until: date!, $ids: [Int!]!, $compilations: [Boolean!]!) {
  series(where: {id: {_in: $ids}}) {
    id
    name
    slug
    book_series(where: {book: {",
    release_filter!(),
    "}}) { book { ...BookFields } }
  }
}"
);

pub(super) const USER_LIBRARY: &str = concat!(
    book_fields!(),
    "query UserLibrary($username: citext!, $since: date!) {
  users(where: {username: {_eq: $username}}, limit: 1) { id username }
  user_books(where: {user: {username: {_eq: $username}}, date_added: {_gte: $since}}) {
    book { ...BookFields }
  }
}"
);
