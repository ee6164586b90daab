// src/ingest/chunk.rs
//! Sliding-window chunker over whitespace tokens.
//!
//! A token is a whitespace-separated word, not a model tokenizer unit, so
//! chunk boundaries do not depend on which embedding model is deployed.
//!
//! Guarantees:
//! - empty or whitespace-only text yields no chunks;
//! - text with at most `chunk_size` tokens yields exactly one chunk;
//! - windows advance by `max(chunk_size - overlap, 1)` tokens, so
//!   `overlap >= chunk_size` still terminates;
//! - the last chunk ends exactly at the final token;
//! - `chunk_index` is contiguous from 0.

use super::types::Chunk;

pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let total = words.len();

    if total <= chunk_size {
        return vec![Chunk {
            text: text.trim().to_string(),
            start_token: 0,
            end_token: total,
            chunk_index: 0,
        }];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::with_capacity(total / step + 1);
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(total);
        chunks.push(Chunk {
            text: words[start..end].join(" "),
            start_token: start,
            end_token: end,
            chunk_index: chunks.len(),
        });
        if end >= total {
            break;
        }
        start += step;
    }

    chunks
}
