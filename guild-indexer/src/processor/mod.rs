//! Processor module for the guild indexer ingest.
//!
//! Keeps the created guilds of a polled batch and turns them into search documents.

mod enrichment;
mod filter;

pub use enrichment::{resolve_members, EnrichmentError, GuildEnricher};
pub use filter::{CreatedGuild, EventFilter};
