// Core modules implementing quoting, chunked capture, stream parsing, and error modeling.
pub mod command;
pub mod error;
pub mod reader;
pub mod stream_parser;
pub mod utf8;
