//! In-memory feed sessions kept fresh by polling and backfill.
//!
//! - [`FeedSession`] - article list, cursor and load generation (no I/O)
//! - [`FeedEngine`] - async operations over a shared session
//! - [`Scheduler`] - injectable periodic timer used by the engine

mod engine;
mod scheduler;
mod state;

pub use engine::{FeedEngine, LoadOutcome, SessionEvent, SyncSettings};
pub use scheduler::{ScheduledTask, Scheduler, TickFn, TickFuture, TokioScheduler};
pub use state::{FeedSession, LoadState};
