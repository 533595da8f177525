//! Projection engine for Strand.
//!
//! Projections are read-optimized views folded from the event log. They are
//! never a source of truth: any projection can be reset and rebuilt from the
//! first event, and doing so yields byte-identical state to applying the same
//! events incrementally.
//!
//! The engine fails open. A projection that cannot apply an event logs a
//! warning and the failure is reported, but other projections and the write
//! path carry on.

pub mod engine;
pub mod error;
pub mod projection;
pub mod views;

pub use engine::{ApplyReport, CancellationToken, ProjectionEngine, RebuildOutcome};
pub use error::{ProjectionError, ProjectionResult};
pub use projection::Projection;
pub use views::{
    AccountIndex, MessageRecord, MessageView, ThreadIndex, Timeline, TimelineEntry,
};
