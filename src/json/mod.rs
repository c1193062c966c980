//! Purpose: Internal JSON parsing boundary shared by runtime callsites.
//! Exports: `parse` module with decode and failure-categorization helpers.
//! Role: Single seam for parser diagnostics so callsites avoid ad hoc message handling.
//! Invariants: Helper APIs stay small and deterministic (no hidden global state).

pub(crate) mod parse;
