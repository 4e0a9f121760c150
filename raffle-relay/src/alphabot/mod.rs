//! Alphabot API client: raffle registration and raffle lookups.

pub mod client;
pub mod models;

pub use client::{AlphabotClient, RaffleApi};
pub use models::{ApiError, ApiResponse, ApiResult, RegistrationOutcome, RegistrationRequest};
