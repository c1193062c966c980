//! Purpose: Classify JSON parse failures into stable categories with hint text.
//! Exports: `ParseFailureCategory`, `categorize_error`, `categorize_message`, `hint_for_message`.
//! Role: Parser boundary so CLI input and captured-stream diagnostics share one vocabulary.
//! Invariants: Categories are derived from serde_json error classes or message text only.
//! Invariants: Hints never echo payload bytes; they name the category and the caller context.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ParseFailureCategory {
    Syntax,
    Eof,
    NumericRange,
    Utf8,
    DepthLimit,
    Unknown,
}

impl ParseFailureCategory {
    pub fn label(self) -> &'static str {
        match self {
            ParseFailureCategory::Syntax => "syntax",
            ParseFailureCategory::Eof => "unexpected-eof",
            ParseFailureCategory::NumericRange => "numeric-range",
            ParseFailureCategory::Utf8 => "utf8",
            ParseFailureCategory::DepthLimit => "depth-limit",
            ParseFailureCategory::Unknown => "unknown",
        }
    }
}

pub fn categorize_error(err: &serde_json::Error) -> ParseFailureCategory {
    match err.classify() {
        serde_json::error::Category::Eof => ParseFailureCategory::Eof,
        _ => categorize_message(&err.to_string()),
    }
}

pub fn categorize_message(message: &str) -> ParseFailureCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("recursion limit") || lower.contains("depth limit") {
        ParseFailureCategory::DepthLimit
    } else if lower.contains("utf-8") || lower.contains("utf8") || lower.contains("unicode") {
        ParseFailureCategory::Utf8
    } else if lower.contains("number out of range") {
        ParseFailureCategory::NumericRange
    } else if lower.contains("eof while parsing") {
        ParseFailureCategory::Eof
    } else if lower.contains("expected")
        || lower.contains("trailing")
        || lower.contains("invalid")
        || lower.contains("control character")
        || lower.contains("key must be a string")
    {
        ParseFailureCategory::Syntax
    } else {
        ParseFailureCategory::Unknown
    }
}

pub fn hint_for_message(message: &str, context: &str) -> String {
    let category = categorize_message(message);
    format!("parse category: {}; context: {context}", category.label())
}
