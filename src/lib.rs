//! Feed ingestion and sync engine.
//!
//! Fetches RSS and Atom feeds, normalizes them into one article model,
//! pages through Blogger-style backlogs and keeps an in-memory session
//! fresh with polling and background backfill. A short-TTL page cache sits
//! in front of the fetch → parse pipeline, and an HTTP server exposes the
//! pipeline as a relay and a paginated JSON endpoint.

pub mod cache;
pub mod config;
pub mod display;
pub mod feed;
pub mod server;
pub mod session;
pub mod util;
