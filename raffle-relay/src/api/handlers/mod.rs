//! HTTP request handlers.
//!
//! - [`webhooks`]: inbound Alphabot webhook ingestion

pub mod webhooks;
