//! Purpose: Hold top-level CLI command dispatch for `shjson`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Nothing is written to stdout unless the whole command succeeded.
//! Invariants: JSON passed on the command line is rejected as a usage error before anything runs.

use super::*;
use shjson::api::{
    CaptureConfig, CaptureMode, Captured, categorize_error, run_with, serialize, serialize_args,
};

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "shjson", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Run {
            command,
            args,
            raw,
            jsonl,
            chunk_bytes,
            shell,
        } => {
            let command_text = match (command, args) {
                (Some(text), None) => text,
                (None, Some(spec)) => serialize(&parse_json_arg(&spec, "--args")?)?,
                _ => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("run requires a command or --args")
                        .with_hint("Use `shjson run '<command>'` or `shjson run --args '[...]'`."));
                }
            };
            let mode = if raw {
                CaptureMode::RawText
            } else {
                CaptureMode::ParseStream
            };
            let config = CaptureConfig::new(mode)
                .with_chunk_bytes(chunk_bytes)
                .with_shell(shell);
            match run_with(&command_text, &config)? {
                Captured::Text(text) => emit_text(&text)?,
                Captured::Values(values) if jsonl => {
                    let mut lines = String::new();
                    for value in &values {
                        lines.push_str(&value.to_string());
                        lines.push('\n');
                    }
                    emit_text(&lines)?;
                }
                Captured::Values(values) => emit_json(&Value::Array(values))?,
            }
            Ok(RunOutcome::ok())
        }
        Command::Quote { values, words } => {
            let command_text = if words {
                serialize_args(&values)
            } else {
                let [value] = values.as_slice() else {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("quote expects exactly one JSON value")
                        .with_hint("Pass a JSON array, or use --words to quote plain words."));
                };
                serialize(&parse_json_arg(value, "quote")?)?
            };
            emit_text(&format!("{command_text}\n"))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn parse_json_arg(text: &str, context: &str) -> Result<Value, Error> {
    serde_json::from_str(text).map_err(|err| {
        let category = categorize_error(&err);
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid JSON for {context}"))
            .with_hint(format!(
                "parse category: {}; pass a JSON string or array, e.g. '[\"ls\",\"-l\"]'",
                category.label()
            ))
            .with_source(err)
    })
}
