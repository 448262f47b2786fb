//! adsync Client - HTTP client for the Megaphone API
//!
//! - [`megaphone`] - authenticated client for advertisers and campaigns
//! - [`pagination`] - `Link` header pagination
//! - [`rate_limit`] - sliding-window limiter shared by all calls of a client
//!
//! # Overview
//!
//! The client handles authentication, pagination, rate limiting, retries and
//! error mapping. It implements the `RemoteCatalog` and `RemoteMutator`
//! traits of `adsync-core`, so the reconciliation engine never sees HTTP.

pub mod megaphone;
pub mod pagination;
pub mod rate_limit;

pub use megaphone::MegaphoneClient;
pub use rate_limit::RateLimiter;
