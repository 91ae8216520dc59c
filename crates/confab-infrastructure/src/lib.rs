//! Infrastructure for the Confab supervisor: the in-process execution
//! substrate, the filesystem blob store, the concrete wealth-desk
//! activities, and the deterministic responder.

pub mod activities;
pub mod blob;
pub mod responder;
pub mod runtime;

pub use activities::DeskActivities;
pub use blob::FsBlobStore;
pub use responder::DeskResponder;
pub use runtime::{JournalRecord, LocalSubstrate, RECORD_SIZE_CEILING, WorkerHandle};
