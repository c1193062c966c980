//! Purpose: Library crate backing the `shjson` CLI and tests.
//! Exports: `api` (command serialization, subprocess capture, errors).
//! Role: Shell out to external commands and consume their output as text or JSON values.
//! Invariants: `api` is the only public path; `core` and `json` stay internal.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
mod json;
