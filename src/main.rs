//! Purpose: `shjson` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, writes captured output to stdout.
//! Invariants: stdout carries only command output (text verbatim or JSON).
//! Invariants: Non-interactive errors are emitted as JSON on stderr; logs also go to stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use shjson::api::{DEFAULT_CHUNK_BYTES, DEFAULT_SHELL, Error, ErrorKind, to_exit_code};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `shjson --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command).map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "shjson",
    version,
    about = "Run shell commands and capture their output as text or JSON values",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Output is read in bounded chunks without splitting UTF-8 characters.
By default stdout is parsed as a stream of JSON values and printed as one array.
"#,
    after_help = r#"EXAMPLES
  $ shjson run 'printf "1 2 {\"a\":3}"'          # [1,2,{"a":3}]
  $ shjson run --raw 'uname -s'                   # Linux
  $ shjson run --args '["echo","it'"'"'s ok"]'    # runs: 'echo' 'it'\''s ok'
  $ shjson quote '["grep","-e","a b"]'            # 'grep' '-e' 'a b'

LEARN MORE
  $ shjson <command> --help
  Set RUST_LOG=debug to trace spawning and chunk reads on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize error labels on stderr"
    )]
    color: ColorMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Run a command through the shell and capture its stdout",
        long_about = r#"Run a command through the shell and capture its stdout.

The command is either a raw shell string (quoted by you) or, with --args,
a JSON string or array whose elements are each quoted as one argument.
A non-zero exit status, a read failure, or malformed JSON output fails the
run and nothing captured is printed."#
    )]
    Run {
        #[arg(help = "Raw shell command text", required_unless_present = "args")]
        command: Option<String>,
        #[arg(
            long,
            value_name = "JSON",
            conflicts_with = "command",
            help = "JSON string or array to serialize into the command"
        )]
        args: Option<String>,
        #[arg(long, help = "Capture stdout as text instead of parsing JSON values")]
        raw: bool,
        #[arg(
            long,
            conflicts_with = "raw",
            help = "Print one JSON value per line instead of one array"
        )]
        jsonl: bool,
        #[arg(
            long,
            default_value_t = DEFAULT_CHUNK_BYTES,
            help = "Bytes requested per read (clamped to 1..=1MiB)"
        )]
        chunk_bytes: usize,
        #[arg(
            long,
            default_value = DEFAULT_SHELL,
            value_hint = ValueHint::ExecutablePath,
            help = "Shell used as `<shell> -c <command>`"
        )]
        shell: PathBuf,
    },
    #[command(
        arg_required_else_help = true,
        about = "Print the shell command a JSON string or array serializes to"
    )]
    Quote {
        #[arg(
            required = true,
            allow_hyphen_values = true,
            help = "One JSON value, or plain words with --words"
        )]
        values: Vec<String>,
        #[arg(long, help = "Treat each value as a literal word instead of JSON")]
        words: bool,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let is_tty = io::stdout().is_terminal();
    let json = if is_tty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    emit_text(&format!("{json}\n"))
}

fn emit_text(text: &str) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write stdout")
                .with_source(err)
        })
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Type => "type error".to_string(),
        ErrorKind::Launch => "could not run command".to_string(),
        ErrorKind::Read => "read error".to_string(),
        ErrorKind::Parse => "parse error".to_string(),
        ErrorKind::ExitCodeUnavailable => "exit code unavailable".to_string(),
        ErrorKind::NonZeroExit => "non-zero exit".to_string(),
        ErrorKind::Execution => "execution error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(command) = err.command() {
        inner.insert("command".to_string(), json!(command));
    }
    if let Some(code) = err.exit_code() {
        inner.insert("exit_code".to_string(), json!(code));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(command) = err.command() {
        lines.push(format!(
            "{} {command}",
            colorize_label("command:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
