//! Session coordination: discovery, runs, batching and the active-session
//! guard.

pub mod coordinator;
pub mod guard;

pub use coordinator::{group_by_executable, RunCoordinator};
pub use guard::{SessionGuard, SessionSlot};
