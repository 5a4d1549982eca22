//! Line framer for test executable output.
//!
//! Reassembles raw stdout chunks into complete text lines. Any run of `\r`
//! and/or `\n` ends a line, and empty lines are never produced, so the
//! output is identical however the byte stream was split into chunks.
//!
//! # Usage
//!
//! Use [`LineFramer`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`]. At end of stream the pending fragment
//! is emitted as one final line even without a trailing newline.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use cpputf_adapter::protocol::framer::LineFramer;
//!
//! let lines = FramedRead::new(child_stdout, LineFramer::new());
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Sequential accumulator turning output chunks into complete lines.
///
/// The only state is the pending fragment, which lives in the
/// [`BytesMut`] read buffer owned by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineFramer;

impl LineFramer {
    /// Create a new framer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Whether `byte` terminates a line.
fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

impl Decoder for LineFramer {
    type Item = String;
    type Error = AppError;

    /// Decode the next complete line from `src`.
    ///
    /// Returns `Ok(None)` while `src` holds only a fragment; the fragment is
    /// left in place and continued by the next chunk.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        while let Some(pos) = src.iter().position(|&b| is_terminator(b)) {
            let line = src.split_to(pos);
            src.advance(1);
            if !line.is_empty() {
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
        }
        Ok(None)
    }

    /// Decode at end of stream, flushing the pending fragment exactly once.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}
