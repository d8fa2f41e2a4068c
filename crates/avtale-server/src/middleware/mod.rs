pub mod rate_limit;

pub use rate_limit::{login_limiter, RateLimiter};
