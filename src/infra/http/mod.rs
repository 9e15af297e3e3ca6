mod middleware;
mod public;
mod rate_limit;

use std::{sync::Arc, time::Duration};

pub use middleware::{RequestContext, client_address};
pub use public::build_router;
pub use rate_limit::RateLimiter;

use crate::application::feed::FeedService;

#[derive(Clone)]
pub struct HttpState {
    pub feeds: Arc<FeedService>,
    /// Lifetime of cached collections; drives `Cache-Control: max-age`.
    pub collection_ttl: Duration,
    pub request_timeout: Duration,
    pub rate_limiter: Option<RateLimiter>,
    pub log_requests: bool,
}
