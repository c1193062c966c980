//! Purpose: Run a shell command and capture its stdout as text or as a JSON value stream.
//! Exports: `CaptureMode`, `CaptureConfig`, `Captured`, `capture`, `run`, `run_with`, `run_args`.
//! Role: Streaming subprocess reader; `capture` works over any `Read`, `run_with` drives the child.
//! Invariants: Chunks handed to decoding or parsing never end inside a UTF-8 codepoint
//! unless the stream itself ends there.
//! Invariants: Any failure discards everything accumulated; partial results are never returned.
//! Invariants: The child is always waited on, including after a parse error aborts reading.
//! Invariants: Failure precedence is parse > read > wait > non-zero exit > abnormal termination.
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use bstr::ByteSlice;
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::command::serialize;
use super::error::{Error, ErrorKind};
use super::stream_parser::{Pull, StreamParser};
use super::utf8::{MAX_UTF8_LEN, missing_continuation};
use crate::json::parse::hint_for_message;

pub const DEFAULT_CHUNK_BYTES: usize = 4096;
pub const DEFAULT_SHELL: &str = "/bin/sh";
/// Upper bound on `chunk_bytes`; larger requests are clamped.
pub const MAX_CHUNK_BYTES: usize = 1 << 20;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CaptureMode {
    /// Accumulate stdout as one string.
    RawText,
    /// Parse stdout as back-to-back JSON values.
    ParseStream,
}

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    /// Bytes requested per primary read, clamped to `1..=MAX_CHUNK_BYTES`.
    /// The buffer carries `MAX_UTF8_LEN` extra.
    pub chunk_bytes: usize,
    pub shell: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::RawText,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl CaptureConfig {
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Captured {
    Text(String),
    Values(Vec<Value>),
}

impl Captured {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Captured::Text(text) => Some(text),
            Captured::Values(_) => None,
        }
    }

    pub fn as_values(&self) -> Option<&[Value]> {
        match self {
            Captured::Text(_) => None,
            Captured::Values(values) => Some(values),
        }
    }

    /// JSON form: a string for text captures, an array for value captures.
    pub fn into_value(self) -> Value {
        match self {
            Captured::Text(text) => Value::String(text),
            Captured::Values(values) => Value::Array(values),
        }
    }
}

pub fn run(command: &str, mode: CaptureMode) -> Result<Captured, Error> {
    run_with(command, &CaptureConfig::new(mode))
}

/// Serializes a JSON command spec (string or array) and runs it.
pub fn run_args(spec: &Value, config: &CaptureConfig) -> Result<Captured, Error> {
    let command = serialize(spec)?;
    run_with(&command, config)
}

pub fn run_with(command: &str, config: &CaptureConfig) -> Result<Captured, Error> {
    debug!(
        command,
        shell = %config.shell.display(),
        mode = ?config.mode,
        "spawning command"
    );
    let mut child = Command::new(&config.shell)
        .arg("-c")
        .arg(command)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|err| {
            Error::new(ErrorKind::Launch)
                .with_message("could not run command")
                .with_command(command)
                .with_source(err)
        })?;

    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(Error::new(ErrorKind::Internal)
            .with_message("child stdout was not captured")
            .with_command(command));
    };

    // `capture` consumes the pipe, so the read end is closed before waiting and a
    // child still writing after an early abort gets EPIPE instead of blocking.
    let captured = capture(stdout, config, command);
    let status = child.wait();
    debug!(command, status = ?status, "command finished");
    classify(command, captured, status)
}

/// Reads `reader` to the end in chunks and accumulates per `config.mode`.
///
/// Read failures map to `ErrorKind::Read`, malformed JSON to `ErrorKind::Parse`.
/// `command` is only used to label errors.
pub fn capture<R: Read>(
    reader: R,
    config: &CaptureConfig,
    command: &str,
) -> Result<Captured, Error> {
    let chunk_bytes = config.chunk_bytes.clamp(1, MAX_CHUNK_BYTES);
    let mut buf = vec![0u8; chunk_bytes + MAX_UTF8_LEN];
    let mut source = ChunkSource::new(reader);
    let mut acc = Accumulator::new(config.mode);
    let read_error = |err: io::Error| {
        Error::new(ErrorKind::Read)
            .with_message("failed to read command output")
            .with_command(command)
            .with_source(err)
    };

    while !source.exhausted {
        let mut len = source.fill(&mut buf[..chunk_bytes]).map_err(read_error)?;
        let missing = missing_continuation(&buf[..len]);
        if missing > 0 && !source.exhausted {
            len += source
                .fill(&mut buf[len..len + missing])
                .map_err(read_error)?;
        }
        trace!(
            bytes = len,
            completed = missing,
            final_chunk = source.exhausted,
            "read chunk"
        );

        if let Err(message) = acc.push(&buf[..len], source.exhausted) {
            warn!(command, error = %message, "aborting capture on parse error");
            let hint = hint_for_message(&message, "command output");
            return Err(Error::new(ErrorKind::Parse)
                .with_message(message)
                .with_hint(hint)
                .with_command(command));
        }
    }

    Ok(acc.finish())
}

fn classify(
    command: &str,
    captured: Result<Captured, Error>,
    status: io::Result<ExitStatus>,
) -> Result<Captured, Error> {
    let captured = match captured {
        Err(err) if err.kind() == ErrorKind::Parse => return Err(err),
        other => other,
    };
    let status = match status {
        Ok(status) => status,
        Err(err) => {
            return Err(match captured {
                Err(read) => read,
                Ok(_) => wait_error(command, err),
            });
        }
    };
    let captured = captured?;
    if status.success() {
        return Ok(captured);
    }
    if let Some(code) = status.code() {
        return Err(Error::new(ErrorKind::NonZeroExit)
            .with_message(format!("exit code ({code}) isn't zero executing command"))
            .with_exit_code(code)
            .with_command(command));
    }
    Err(Error::new(ErrorKind::Execution)
        .with_message("error executing command")
        .with_command(command)
        .with_source(io::Error::other(abnormal_exit_description(status))))
}

fn wait_error(command: &str, err: io::Error) -> Error {
    if err.raw_os_error() == Some(libc::ECHILD) {
        return Error::new(ErrorKind::ExitCodeUnavailable)
            .with_message("cannot obtain exit code executing command")
            .with_command(command)
            .with_source(err);
    }
    Error::new(ErrorKind::Execution)
        .with_message("error executing command")
        .with_command(command)
        .with_source(err)
}

#[cfg(unix)]
fn abnormal_exit_description(status: ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("terminated by signal {signal}"),
        None => format!("abnormal termination ({status})"),
    }
}

#[cfg(not(unix))]
fn abnormal_exit_description(status: ExitStatus) -> String {
    format!("abnormal termination ({status})")
}

struct ChunkSource<R> {
    inner: R,
    exhausted: bool,
}

impl<R: Read> ChunkSource<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            exhausted: false,
        }
    }

    /// Fills `buf` completely unless end of stream comes first.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.exhausted = true;
                    break;
                }
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

enum Accumulator {
    Text(String),
    Values {
        values: Vec<Value>,
        parser: StreamParser,
    },
}

impl Accumulator {
    fn new(mode: CaptureMode) -> Self {
        match mode {
            CaptureMode::RawText => Accumulator::Text(String::new()),
            CaptureMode::ParseStream => Accumulator::Values {
                values: Vec::new(),
                parser: StreamParser::new(),
            },
        }
    }

    fn push(&mut self, chunk: &[u8], is_final: bool) -> Result<(), String> {
        match self {
            Accumulator::Text(text) => {
                text.push_str(&chunk.to_str_lossy());
                Ok(())
            }
            Accumulator::Values { values, parser } => {
                parser.feed(chunk, false);
                if is_final {
                    parser.finish();
                }
                loop {
                    match parser.next_value() {
                        Pull::Value(value) => values.push(value),
                        Pull::NeedMore => return Ok(()),
                        Pull::Error(message) => return Err(message),
                    }
                }
            }
        }
    }

    fn finish(self) -> Captured {
        match self {
            Accumulator::Text(text) => Captured::Text(text),
            Accumulator::Values { values, parser } => {
                debug_assert!(parser.is_drained(), "capture ended with buffered input");
                Captured::Values(values)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureConfig, CaptureMode, Captured, MAX_CHUNK_BYTES, capture};
    use crate::core::error::ErrorKind;
    use serde_json::json;
    use std::io::{self, Read};

    /// Hands out at most `step` bytes per read, then optionally fails.
    struct Dribble<'a> {
        data: &'a [u8],
        step: usize,
        fail_at_end: bool,
    }

    impl Read for Dribble<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.is_empty() {
                if self.fail_at_end {
                    return Err(io::Error::other("pipe broke"));
                }
                return Ok(0);
            }
            let take = self.step.min(buf.len()).min(self.data.len());
            buf[..take].copy_from_slice(&self.data[..take]);
            self.data = &self.data[take..];
            Ok(take)
        }
    }

    fn raw(chunk_bytes: usize) -> CaptureConfig {
        CaptureConfig::new(CaptureMode::RawText).with_chunk_bytes(chunk_bytes)
    }

    fn stream(chunk_bytes: usize) -> CaptureConfig {
        CaptureConfig::new(CaptureMode::ParseStream).with_chunk_bytes(chunk_bytes)
    }

    #[test]
    fn raw_capture_preserves_codepoints_across_every_boundary() {
        let base = "é漢🦀a🦀漢é";
        for pad in 0..8 {
            let text = format!("{}{base}{base}", "x".repeat(pad));
            for chunk in 1..=9 {
                for step in [1, 3, 64] {
                    let reader = Dribble {
                        data: text.as_bytes(),
                        step,
                        fail_at_end: false,
                    };
                    let captured = capture(reader, &raw(chunk), "test").expect("capture");
                    assert_eq!(
                        captured,
                        Captured::Text(text.clone()),
                        "pad {pad} chunk {chunk}"
                    );
                }
            }
        }
    }

    #[test]
    fn raw_capture_replaces_invalid_bytes() {
        let data = [b'a', 0xff, b'b'];
        let captured = capture(&data[..], &raw(2), "test").expect("capture");
        assert_eq!(captured.as_text(), Some("a\u{fffd}b"));
    }

    #[test]
    fn stream_capture_matches_whole_parse() {
        let text = r#"{"name":"漢字","n":[1,2,3]} 42 "🦀" [true,false,null] 7"#;
        let whole = serde_json::Deserializer::from_str(text)
            .into_iter::<serde_json::Value>()
            .collect::<Result<Vec<_>, _>>()
            .expect("whole parse");
        for chunk in 1..=text.len() {
            let captured = capture(text.as_bytes(), &stream(chunk), "test").expect("capture");
            assert_eq!(captured.as_values(), Some(whole.as_slice()), "chunk {chunk}");
        }
    }

    #[test]
    fn stream_ending_on_chunk_boundary_flushes_trailing_number() {
        let captured = capture(&b"1 22"[..], &stream(4), "test").expect("capture");
        assert_eq!(captured, Captured::Values(vec![json!(1), json!(22)]));
    }

    #[test]
    fn empty_output_yields_empty_results() {
        assert_eq!(
            capture(&b""[..], &raw(8), "test").unwrap(),
            Captured::Text(String::new())
        );
        assert_eq!(
            capture(&b"\n"[..], &stream(8), "test").unwrap(),
            Captured::Values(Vec::new())
        );
    }

    #[test]
    fn parse_error_discards_earlier_values() {
        let err = capture(&b"{\"ok\":1}\n{oops"[..], &stream(3), "emit").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.command(), Some("emit"));
        assert!(err.hint().unwrap().contains("parse category"));
    }

    #[test]
    fn read_failure_is_reported_even_after_data() {
        let reader = Dribble {
            data: b"partial output",
            step: 4,
            fail_at_end: true,
        };
        let err = capture(reader, &raw(64), "flaky").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Read);
        assert_eq!(err.command(), Some("flaky"));
    }

    #[test]
    fn zero_chunk_size_is_clamped() {
        let captured = capture(&b"abc"[..], &raw(0), "test").expect("capture");
        assert_eq!(captured.as_text(), Some("abc"));
    }

    #[test]
    fn oversized_chunk_size_is_clamped() {
        let captured = capture(&b"abc"[..], &raw(usize::MAX), "test").expect("capture");
        assert_eq!(captured.as_text(), Some("abc"));

        let config = stream(MAX_CHUNK_BYTES + 1);
        let captured = capture(&b"1 2"[..], &config, "test").expect("capture");
        assert_eq!(captured, Captured::Values(vec![json!(1), json!(2)]));
    }

    #[test]
    fn stream_capture_replaces_invalid_bytes_inside_strings() {
        let data = b"\"a\xffb\" 1";
        for chunk in 1..=data.len() {
            let captured = capture(&data[..], &stream(chunk), "test").expect("capture");
            assert_eq!(
                captured,
                Captured::Values(vec![json!("a\u{fffd}b"), json!(1)]),
                "chunk {chunk}"
            );
        }
    }

    #[test]
    fn stream_capture_accepts_nesting_past_serde_default() {
        let text = format!("{}{} 3", "[".repeat(200), "]".repeat(200));
        let captured = capture(text.as_bytes(), &stream(16), "test").expect("capture");
        let values = captured.as_values().expect("values");
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], json!(3));
    }

    #[cfg(unix)]
    mod exit_status {
        use super::super::{Captured, classify};
        use crate::core::error::{Error, ErrorKind};
        use std::io;
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        fn ok() -> Result<Captured, Error> {
            Ok(Captured::Text("out".to_string()))
        }

        #[test]
        fn clean_exit_returns_capture() {
            let result = classify("cmd", ok(), Ok(ExitStatus::from_raw(0)));
            assert_eq!(result.unwrap(), Captured::Text("out".to_string()));
        }

        #[test]
        fn non_zero_exit_overrides_capture() {
            let err = classify("cmd", ok(), Ok(ExitStatus::from_raw(2 << 8))).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NonZeroExit);
            assert_eq!(err.exit_code(), Some(2));
            assert_eq!(err.message(), Some("exit code (2) isn't zero executing command"));
        }

        #[test]
        fn signal_termination_is_execution_error() {
            let err = classify("cmd", ok(), Ok(ExitStatus::from_raw(9))).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Execution);
            assert!(err.exit_code().is_none());
        }

        #[test]
        fn missing_child_is_distinct_from_other_wait_failures() {
            let echild = io::Error::from_raw_os_error(libc::ECHILD);
            let err = classify("cmd", ok(), Err(echild)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ExitCodeUnavailable);

            let other = io::Error::from_raw_os_error(libc::EINVAL);
            let err = classify("cmd", ok(), Err(other)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Execution);
        }

        #[test]
        fn parse_error_skips_status_checks() {
            let parse = Err(Error::new(ErrorKind::Parse).with_message("bad"));
            let err = classify("cmd", parse, Ok(ExitStatus::from_raw(2 << 8))).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse);
        }

        #[test]
        fn read_error_wins_over_clean_exit() {
            let read = Err(Error::new(ErrorKind::Read));
            let err = classify("cmd", read, Ok(ExitStatus::from_raw(0))).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Read);
        }
    }
}
