//! Purpose: Detect UTF-8 codepoints split by the end of a read chunk.
//! Exports: `MAX_UTF8_LEN`, `missing_continuation`.
//! Role: Boundary probe used by the chunked reader before decoding or parsing.
//! Invariants: Only inspects the last `MAX_UTF8_LEN` bytes; never decodes.
//! Invariants: Returns 0 for complete or malformed tails (invalid input is left to the decoder).

/// Longest encoded codepoint; also the slack reserved at the end of a read buffer.
pub const MAX_UTF8_LEN: usize = 4;

/// Number of bytes still needed to complete the codepoint the chunk ends in.
pub fn missing_continuation(chunk: &[u8]) -> usize {
    let mut trailing = 0usize;
    for &byte in chunk.iter().rev().take(MAX_UTF8_LEN) {
        if is_continuation(byte) {
            trailing += 1;
            continue;
        }
        let have = trailing + 1;
        return match sequence_len(byte) {
            Some(width) if width > have => width - have,
            _ => 0,
        };
    }
    0
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

fn sequence_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7f => Some(1),
        0xc2..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf4 => Some(4),
        _ => None,
    }
}
