//! Purpose: Turn a JSON command specification into one POSIX `sh` command string.
//! Exports: `shell_escape`, `serialize`, `serialize_args`.
//! Role: Command serializer; pure, no process interaction.
//! Invariants: A string spec passes through untouched; it is already shell text.
//! Invariants: Each array element becomes exactly one shell word after `sh` unquoting.
//! Invariants: Only strings and arrays are accepted; other kinds fail before any output is built.
use serde_json::Value;

use super::error::{Error, ErrorKind};

/// Wraps `text` in single quotes, rewriting each embedded `'` as `'\''`.
pub fn shell_escape(text: &str) -> String {
    let quotes = text.bytes().filter(|byte| *byte == b'\'').count();
    let mut escaped = String::with_capacity(text.len() + 2 + quotes * 3);
    escaped.push('\'');
    for ch in text.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

pub fn serialize_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut command = String::new();
    for (idx, arg) in args.into_iter().enumerate() {
        if idx > 0 {
            command.push(' ');
        }
        command.push_str(&shell_escape(arg.as_ref()));
    }
    command
}

pub fn serialize(spec: &Value) -> Result<String, Error> {
    match spec {
        Value::String(command) => Ok(command.clone()),
        Value::Array(items) => {
            let words = items.iter().map(argument_text).collect::<Vec<_>>();
            Ok(serialize_args(&words))
        }
        other => Err(Error::new(ErrorKind::Type)
            .with_message("command argument must be a string or array")
            .with_hint(format!("got {}", kind_name(other)))),
    }
}

fn argument_text(item: &Value) -> String {
    match item {
        Value::String(text) => text.clone(),
        // Display for Value is the compact canonical encoding.
        other => other.to_string(),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::{serialize, serialize_args, shell_escape};
    use crate::core::error::ErrorKind;
    use serde_json::{Value, json};

    #[test]
    fn shell_escape_handles_empty_string() {
        assert_eq!(shell_escape(""), "''");
    }

    #[test]
    fn shell_escape_escapes_single_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
        assert_eq!(shell_escape("''"), "''\\'''\\'''");
    }

    #[test]
    fn shell_escape_leaves_other_metacharacters_inert() {
        assert_eq!(shell_escape("$HOME `id` \\n *"), "'$HOME `id` \\n *'");
        assert_eq!(shell_escape("a\nb"), "'a\nb'");
        assert_eq!(shell_escape("éß漢"), "'éß漢'");
    }

    #[test]
    fn string_spec_passes_through() {
        let spec = json!("echo 'already quoted' | wc -c");
        assert_eq!(serialize(&spec).unwrap(), "echo 'already quoted' | wc -c");
    }

    #[test]
    fn array_spec_quotes_every_word() {
        let spec = json!(["echo", "it's ok"]);
        assert_eq!(serialize(&spec).unwrap(), "'echo' 'it'\\''s ok'");
    }

    #[test]
    fn non_string_elements_use_compact_json() {
        let spec = json!(["printf", 1, true, null, {"a": [1, "x"]}, 2.5]);
        assert_eq!(
            serialize(&spec).unwrap(),
            "'printf' '1' 'true' 'null' '{\"a\":[1,\"x\"]}' '2.5'"
        );
    }

    #[test]
    fn empty_array_is_empty_command() {
        assert_eq!(serialize(&json!([])).unwrap(), "");
        assert_eq!(serialize_args(Vec::<String>::new()), "");
    }

    #[test]
    fn other_kinds_are_type_errors() {
        for spec in [json!(1), json!(true), Value::Null, json!({"cmd": "ls"})] {
            let err = serialize(&spec).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Type);
            assert_eq!(
                err.message(),
                Some("command argument must be a string or array")
            );
        }
    }

    #[test]
    fn typed_args_match_array_spec() {
        let words = ["grep", "-e", "a b", "--", "x'y"];
        assert_eq!(serialize_args(words), serialize(&json!(words)).unwrap());
    }
}
