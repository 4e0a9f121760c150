//! HTTP surface.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! Routes:
//!
//! - `POST /webhook/alphabot`: Alphabot raffle webhooks
//! - `GET /healthz`: liveness
//! - `GET /docs`: OpenAPI reference (Scalar)

pub mod handlers;
pub mod models;
