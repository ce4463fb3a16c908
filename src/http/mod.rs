//! HTTP client module
//!
//! Provides the HTTP client used by both source clients, with retry,
//! rate limiting, and backoff strategies.
//!
//! # Features
//!
//! - **Automatic Retries**: Bounded retry of 429/5xx/timeouts with backoff
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Backoff Strategies**: Constant, linear, and exponential backoff
//! - **Authentication**: Bearer token resolved outside the core

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
