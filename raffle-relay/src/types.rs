//! Identifier aliases shared across modules.
//!
//! Participants are keyed by their chat-platform identity (a Discord user snowflake in practice)
//! and raffles by their Alphabot slug. Both are opaque to this crate.

/// Chat-platform identity of an enrolled participant. Sent upstream as `discordId`.
pub type ParticipantId = String;

/// Unique Alphabot raffle identifier.
pub type RaffleSlug = String;
