//! Purpose: Define the stable public Rust API boundary for shjson.
//! Exports: Command serialization, subprocess capture, the stream parser, and the error model.
//! Role: Public, additive-only surface; hides internal module layout.
//! Invariants: This module is the only public path to core primitives.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::command::{serialize, serialize_args, shell_escape};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::reader::{
    CaptureConfig, CaptureMode, Captured, DEFAULT_CHUNK_BYTES, DEFAULT_SHELL, MAX_CHUNK_BYTES,
    capture, run, run_args, run_with,
};
pub use crate::core::stream_parser::{MAX_DEPTH, Pull, StreamParser};
pub use crate::core::utf8::{MAX_UTF8_LEN, missing_continuation};
pub use crate::json::parse::{ParseFailureCategory, categorize_error, categorize_message};
