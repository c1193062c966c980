//! Purpose: Incrementally split a byte stream into back-to-back JSON values.
//! Exports: `StreamParser`, `Pull`.
//! Role: Streaming value parser behind the reader's JSON capture mode.
//! Invariants: Each input byte is scanned once for value boundaries.
//! Invariants: serde_json decodes only complete spans.
//! Invariants: A value is yielded only once its end is certain (closer, separator, or final input).
//! Invariants: After a terminal error every pull returns that same error; further input is ignored.
//! Invariants: Invalid UTF-8 inside a value decodes as U+FFFD, matching raw capture.
use bstr::ByteSlice;
use serde::Deserialize;
use serde_json::Value;

/// Deepest array/object nesting accepted in a single value.
pub const MAX_DEPTH: usize = 256;

/// Outcome of one pull from the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    Value(Value),
    NeedMore,
    Error(String),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Shape {
    Container,
    String,
    Scalar,
}

#[derive(Copy, Clone, Debug)]
struct Scan {
    shape: Shape,
    // Next byte of `pending` to inspect.
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

#[derive(Debug, Default)]
pub struct StreamParser {
    pending: Vec<u8>,
    offset: usize,
    scan: Option<Scan>,
    is_final: bool,
    failed: Option<String>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends input. `is_final` marks end of input; it cannot be unset.
    pub fn feed(&mut self, chunk: &[u8], is_final: bool) {
        if self.failed.is_some() {
            return;
        }
        self.compact();
        self.pending.extend_from_slice(chunk);
        self.is_final |= is_final;
    }

    pub fn finish(&mut self) {
        self.feed(&[], true);
    }

    /// True once final input was fed and every buffered value has been pulled.
    pub fn is_drained(&self) -> bool {
        self.is_final && self.failed.is_none() && self.skip_whitespace() == self.pending.len()
    }

    pub fn next_value(&mut self) -> Pull {
        if let Some(message) = &self.failed {
            return Pull::Error(message.clone());
        }
        if self.scan.is_none() {
            self.offset = self.skip_whitespace();
            let Some(&lead) = self.pending.get(self.offset) else {
                return Pull::NeedMore;
            };
            self.scan = Some(start_scan(lead, self.offset));
        }

        match self.find_end() {
            Ok(Some(end)) => self.decode(end),
            Ok(None) if self.is_final => self.decode(self.pending.len()),
            Ok(None) => Pull::NeedMore,
            Err(message) => self.fail(message),
        }
    }

    fn skip_whitespace(&self) -> usize {
        let rest = &self.pending[self.offset..];
        let skipped = rest
            .iter()
            .position(|byte| !is_json_whitespace(*byte))
            .unwrap_or(rest.len());
        self.offset + skipped
    }

    fn find_end(&mut self) -> Result<Option<usize>, String> {
        let Some(scan) = self.scan.as_mut() else {
            return Ok(None);
        };
        while scan.pos < self.pending.len() {
            let byte = self.pending[scan.pos];
            match scan.shape {
                Shape::Scalar => {
                    if is_json_whitespace(byte) || is_structural(byte) {
                        return Ok(Some(scan.pos));
                    }
                }
                Shape::String | Shape::Container => {
                    if scan.in_string {
                        if scan.escaped {
                            scan.escaped = false;
                        } else if byte == b'\\' {
                            scan.escaped = true;
                        } else if byte == b'"' {
                            scan.in_string = false;
                            if scan.shape == Shape::String {
                                return Ok(Some(scan.pos + 1));
                            }
                        }
                    } else {
                        match byte {
                            b'"' => scan.in_string = true,
                            b'{' | b'[' => {
                                scan.depth += 1;
                                if scan.depth > MAX_DEPTH {
                                    return Err(format!(
                                        "depth limit of {MAX_DEPTH} exceeded at byte {}",
                                        scan.pos - self.offset
                                    ));
                                }
                            }
                            b'}' | b']' => {
                                scan.depth = scan.depth.saturating_sub(1);
                                if scan.depth == 0 {
                                    return Ok(Some(scan.pos + 1));
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }
            scan.pos += 1;
        }
        Ok(None)
    }

    fn decode(&mut self, end: usize) -> Pull {
        self.scan = None;
        let decoded = decode_span(self.pending[self.offset..end].to_str_lossy().as_bytes());
        match decoded {
            Ok(value) => {
                self.offset = end;
                Pull::Value(value)
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn fail(&mut self, message: String) -> Pull {
        self.scan = None;
        self.failed = Some(message.clone());
        Pull::Error(message)
    }

    fn compact(&mut self) {
        if self.offset == 0 {
            return;
        }
        self.pending.drain(..self.offset);
        if let Some(scan) = self.scan.as_mut() {
            scan.pos -= self.offset;
        }
        self.offset = 0;
    }
}

// Nesting is bounded by the scanner, so serde_json's own recursion guard is lifted.
fn decode_span(bytes: &[u8]) -> serde_json::Result<Value> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value = Value::deserialize(&mut de)?;
    de.end()?;
    Ok(value)
}

fn start_scan(lead: u8, at: usize) -> Scan {
    let (shape, depth, in_string) = match lead {
        b'{' | b'[' => (Shape::Container, 1, false),
        b'"' => (Shape::String, 0, true),
        _ => (Shape::Scalar, 0, false),
    };
    Scan {
        shape,
        pos: at + 1,
        depth,
        in_string,
        escaped: false,
    }
}

fn is_json_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_structural(byte: u8) -> bool {
    matches!(byte, b'{' | b'}' | b'[' | b']' | b'"' | b',' | b':')
}
