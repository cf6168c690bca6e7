//! Pre-screening: structural checks and the rate-limit gate

pub mod prescreen;
pub mod rate_limiter;

pub use prescreen::PreScreener;
pub use rate_limiter::RateLimiter;
