//! HTTP transport module
//!
//! Provides the retrying transport used for every paginated request.
//!
//! # Features
//!
//! - **Bounded Retries**: up to `max_attempts` tries per logical request
//! - **Exponential Backoff**: `base_delay * 2^attempt`, no jitter
//! - **Injectable Sleep**: backoff goes through a [`Sleeper`] so tests never block
//! - **Rate Limiting**: optional client-side token bucket using governor

mod client;
mod rate_limit;
mod sleep;

pub use client::{snippet, HttpResponse, RequestConfig, RetryingTransport, TransportConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use sleep::{RecordingSleeper, Sleeper, TokioSleeper};
