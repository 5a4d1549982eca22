//! Line-oriented stdout protocol spoken by test executables.
//!
//! - [`framer`] reassembles output chunks into complete lines.
//! - [`discovery`] decodes `--discover_tests` output into test cases.
//! - [`decoder`] interprets `--verbose` run output as protocol events.

pub mod decoder;
pub mod discovery;
pub mod framer;

pub use decoder::{CompletionStatus, DecoderOptions, ProtocolEvent, RunDecoder};
pub use discovery::{decode_discovery_line, DecodeWarning};
pub use framer::LineFramer;
