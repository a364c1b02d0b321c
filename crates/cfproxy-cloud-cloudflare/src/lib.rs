//! Cloudflare provider for cfproxy
//!
//! Talks to the Cloudflare v4 REST API with a per-call bearer token and
//! implements [`cfproxy_cloud::ProxyApi`].

pub mod client;
pub mod error;
mod retry;
mod types;

pub use client::{ClientConfig, CloudflareClient, DEFAULT_API_BASE};
pub use error::{CloudflareError, Result};
