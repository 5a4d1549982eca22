//! Test process lifecycle.

pub mod process;

pub use process::{ProcessSupervisor, SessionHandle, SupervisorEvent};
