//! Context expansion: growing a seed into a conversational window.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::error::SearchError;
use super::model::{CandidateSnippet, Seed, Span};
use super::query::build_neighbor_query;
use crate::vespa::IndexClient;

/// Approximate characters per token for the snippet soft cap.
const CHARS_PER_TOKEN: usize = 4;

/// Expansion knobs, lifted out of the search config.
#[derive(Debug, Clone, Copy)]
pub struct ExpandConfig {
    /// Neighbour window half-width in message ids.
    pub message_window: i64,
    /// Time-window fallback half-width in minutes.
    pub time_window_minutes: i64,
    /// Re-query with the time union when fewer messages than this return.
    pub min_messages: usize,
    /// Hard cap on messages per candidate.
    pub max_messages: usize,
    /// Soft token cap on the rendered snippet.
    pub token_limit: usize,
}

/// One neighbouring message inside an expansion window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborMessage {
    pub message_id: i64,
    pub ts: Option<i64>,
    pub text: String,
}

/// Fetches the neighbour window for a seed and assembles the snippet.
///
/// The id window is widened with a time-window union when it comes back too
/// small. Errors drop only this seed's candidate (the caller logs them).
pub async fn expand_seed(
    index: &Arc<dyn IndexClient>,
    seed: &Seed,
    config: &ExpandConfig,
) -> Result<Option<CandidateSnippet>, SearchError> {
    let start_id = seed.message_id - config.message_window;
    let end_id = seed.message_id + config.message_window;
    let hits = ((2 * config.message_window + 1) as usize) * 2;

    let response = index
        .search(build_neighbor_query(
            &seed.chat_id,
            seed.thread_id,
            start_id,
            end_id,
            None,
            hits,
        ))
        .await?;
    let mut neighbors = parse_neighbors(&response);

    if neighbors.len() < config.min_messages {
        if let Some(seed_ms) = seed.message_date_ms {
            let seed_ts = seed_ms / 1000;
            let half = config.time_window_minutes * 60;
            debug!(
                seed_id = seed.message_id,
                got = neighbors.len(),
                "window too small, retrying with time union"
            );

            let response = index
                .search(build_neighbor_query(
                    &seed.chat_id,
                    seed.thread_id,
                    start_id,
                    end_id,
                    Some((seed_ts - half, seed_ts + half)),
                    hits.max(config.max_messages * 2),
                ))
                .await?;
            neighbors = merge_neighbors(neighbors, parse_neighbors(&response));
        }
    }

    Ok(assemble_candidate(seed, neighbors, config))
}

/// Parses neighbour hits, collapsing multiple chunks of one message into the
/// entry that carries text.
pub fn parse_neighbors(response: &Value) -> Vec<NeighborMessage> {
    let hits = response
        .pointer("/root/children")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut by_id: HashMap<i64, NeighborMessage> = HashMap::new();
    for hit in &hits {
        let Some(fields) = hit.get("fields") else {
            continue;
        };
        let Some(message_id) = fields.get("message_id").and_then(Value::as_i64) else {
            continue;
        };
        let neighbor = NeighborMessage {
            message_id,
            ts: fields.get("message_date").and_then(Value::as_i64),
            text: fields
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };
        match by_id.get(&message_id) {
            Some(existing) if !existing.text.is_empty() => {}
            _ => {
                by_id.insert(message_id, neighbor);
            }
        }
    }

    let mut neighbors: Vec<NeighborMessage> = by_id.into_values().collect();
    neighbors.sort_by_key(|n| n.message_id);
    neighbors
}

/// Merges two neighbour sets by message id, preferring entries with text.
pub fn merge_neighbors(
    base: Vec<NeighborMessage>,
    extra: Vec<NeighborMessage>,
) -> Vec<NeighborMessage> {
    let mut by_id: HashMap<i64, NeighborMessage> = HashMap::new();
    for neighbor in base.into_iter().chain(extra) {
        match by_id.get(&neighbor.message_id) {
            Some(existing) if !existing.text.is_empty() => {}
            _ => {
                by_id.insert(neighbor.message_id, neighbor);
            }
        }
    }
    let mut merged: Vec<NeighborMessage> = by_id.into_values().collect();
    merged.sort_by_key(|n| n.message_id);
    merged
}

/// Builds the candidate snippet from a seed and its window.
///
/// Returns `None` when nothing with text remains (an empty seed message in
/// an empty window).
pub fn assemble_candidate(
    seed: &Seed,
    neighbors: Vec<NeighborMessage>,
    config: &ExpandConfig,
) -> Option<CandidateSnippet> {
    // Deduplicate by message id, preferring versions that carry text.
    let mut by_id: HashMap<i64, NeighborMessage> = HashMap::new();
    for neighbor in neighbors {
        match by_id.get(&neighbor.message_id) {
            Some(existing) if !existing.text.is_empty() => {}
            _ => {
                by_id.insert(neighbor.message_id, neighbor);
            }
        }
    }

    // The seed itself must be part of its own window.
    let needs_seed = by_id
        .get(&seed.message_id)
        .map(|n| n.text.is_empty() && !seed.text.is_empty())
        .unwrap_or(true);
    if needs_seed {
        by_id.insert(
            seed.message_id,
            NeighborMessage {
                message_id: seed.message_id,
                ts: seed.message_date_ms.map(|ms| ms / 1000),
                text: seed.text.clone(),
            },
        );
    }

    let mut messages: Vec<NeighborMessage> = by_id.into_values().collect();
    messages.sort_by(|a, b| a.message_id.cmp(&b.message_id).then(a.ts.cmp(&b.ts)));
    messages.retain(|m| !m.text.trim().is_empty());
    if messages.is_empty() {
        return None;
    }

    // Centre an oversized window on the seed.
    if messages.len() > config.max_messages {
        let seed_pos = messages
            .iter()
            .position(|m| m.message_id == seed.message_id)
            .unwrap_or(messages.len() / 2);
        let half = config.max_messages / 2;
        let start = seed_pos
            .saturating_sub(half)
            .min(messages.len() - config.max_messages);
        messages = messages[start..start + config.max_messages].to_vec();
    }

    // Soft size cap: drop the message furthest from the seed until under
    // budget, never the seed itself.
    let char_budget = config.token_limit * CHARS_PER_TOKEN;
    while messages.len() >= 2 && total_chars(&messages) > char_budget {
        let furthest = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.message_id != seed.message_id)
            .max_by_key(|(_, m)| (m.message_id - seed.message_id).abs())
            .map(|(i, _)| i);
        match furthest {
            Some(i) => {
                messages.remove(i);
            }
            None => break,
        }
    }

    let text = messages
        .iter()
        .map(|m| m.text.trim())
        .collect::<Vec<_>>()
        .join("\n");

    let first = messages.first()?;
    let last = messages.last()?;
    let span = Span {
        start_id: first.message_id,
        end_id: last.message_id,
        start_ts: first.ts,
        end_ts: last.ts,
    };

    Some(CandidateSnippet {
        span,
        text,
        message_count: messages.len(),
        seed_score: seed.score,
        retrieval_score: seed.score,
        rerank_score: None,
        seed: seed.clone(),
    })
}

fn total_chars(messages: &[NeighborMessage]) -> usize {
    // Account for the joining newlines as well.
    messages.iter().map(|m| m.text.len() + 1).sum()
}
