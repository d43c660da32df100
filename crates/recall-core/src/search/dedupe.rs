//! Near-duplicate seed filtering.
//!
//! Seeds hitting the same stretch of a conversation add no retrieval value:
//! the context expander would produce overlapping windows. The filter keeps
//! the highest-scoring seed of each cluster.

use super::model::Seed;

/// Drops seeds within `id_gap` message ids or `time_gap_ms` of an already
/// accepted seed in the same chat.
///
/// Seeds are considered in `(score desc, message_date desc)` order, which
/// makes the filter deterministic and keeps the best seed per cluster. A
/// non-empty input always yields at least one seed.
pub fn dedupe_seeds(mut seeds: Vec<Seed>, id_gap: i64, time_gap_ms: i64) -> Vec<Seed> {
    if seeds.is_empty() {
        return seeds;
    }

    seeds.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.message_date_ms.cmp(&a.message_date_ms))
    });

    let mut accepted: Vec<Seed> = Vec::new();

    for seed in &seeds {
        let duplicate = accepted.iter().any(|kept| {
            if kept.chat_id != seed.chat_id {
                return false;
            }
            if (kept.message_id - seed.message_id).abs() <= id_gap {
                return true;
            }
            match (kept.message_date_ms, seed.message_date_ms) {
                (Some(a), Some(b)) => (a - b).abs() <= time_gap_ms,
                _ => false,
            }
        });

        if !duplicate {
            accepted.push(seed.clone());
        }
    }

    if accepted.is_empty() {
        // Degenerate gaps can reject everything; keep the best seed.
        accepted.push(seeds.remove(0));
    }

    accepted
}

/// Caps the number of seeds kept per chat, preserving order.
pub fn cap_seeds_per_chat(seeds: Vec<Seed>, per_chat: usize) -> Vec<Seed> {
    use std::collections::HashMap;

    let mut counts: HashMap<String, usize> = HashMap::new();
    seeds
        .into_iter()
        .filter(|seed| {
            let count = counts.entry(seed.chat_id.clone()).or_insert(0);
            *count += 1;
            *count <= per_chat
        })
        .collect()
}
