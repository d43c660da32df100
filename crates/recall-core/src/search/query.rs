//! YQL query construction for seed search and neighbour fetches.

use serde_json::{Value, json};

use crate::embed::{EMBED_MODEL_SMALL, EMBED_DIM_SMALL, EMBED_DIM_LARGE};

/// Engine-side query timeout token.
const QUERY_TIMEOUT: &str = "5s";

/// Dense field / ranking routing for the configured embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorRouting {
    pub vector_field: &'static str,
    pub ranking_profile: &'static str,
    pub tensor_param: &'static str,
    pub expected_dims: usize,
}

/// Picks the dense field and ranking profile for `embed_model`.
pub fn vector_routing(embed_model: &str) -> VectorRouting {
    if embed_model == EMBED_MODEL_SMALL {
        VectorRouting {
            vector_field: "vector_small",
            ranking_profile: "hybrid-small",
            tensor_param: "qv_small",
            expected_dims: EMBED_DIM_SMALL,
        }
    } else {
        VectorRouting {
            vector_field: "vector_large",
            ranking_profile: "hybrid-large",
            tensor_param: "qv_large",
            expected_dims: EMBED_DIM_LARGE,
        }
    }
}

/// `true` when the query contains any Cyrillic codepoint.
pub fn contains_cyrillic(text: &str) -> bool {
    text.chars().any(|c| ('\u{0400}'..='\u{04FF}').contains(&c))
}

/// Percent-escapes single quotes for embedding in a YQL string literal.
fn escape_yql(value: &str) -> String {
    value.replace('\'', "%27")
}

/// Filter excluding tombstoned chunks.
const NOT_DELETED_FILTER: &str = "(!(hasField(deleted_at)) or deleted_at = 0)";

/// Builds the hybrid (or lexical-only) seed query body.
///
/// The nearest-neighbour clause is attached only when `query_vector` is
/// present; the ranking profile follows.
pub fn build_seed_query(
    q: &str,
    seed_limit: usize,
    chat_id: Option<&str>,
    thread_id: Option<i64>,
    query_vector: Option<&[f32]>,
    embed_model: &str,
) -> Value {
    let routing = vector_routing(embed_model);

    let mut filters = vec![NOT_DELETED_FILTER.to_string()];
    if let Some(chat_id) = chat_id {
        filters.push(format!("chat_id contains '{}'", escape_yql(chat_id)));
    }
    if let Some(thread_id) = thread_id {
        filters.push(format!("thread_id = {}", thread_id));
    }

    let mut where_segments = Vec::new();
    if query_vector.is_some() {
        where_segments.push(format!(
            "([{{targetHits:{}}}]nearestNeighbor({},{}))",
            seed_limit, routing.vector_field, routing.tensor_param
        ));
    }
    where_segments.push("(userInput(@q))".to_string());

    let core_clause = format!(
        "({}) and ({})",
        where_segments.join(" or "),
        filters.join(" and ")
    );
    let yql = format!("select * from sources * where {}", core_clause);

    let mut body = json!({
        "yql": yql,
        "hits": seed_limit,
        "ranking": if query_vector.is_some() { routing.ranking_profile } else { "default" },
        "timeout": QUERY_TIMEOUT,
        "q": q,
    });

    let obj = body.as_object_mut().expect("body is an object");
    if let Some(vector) = query_vector {
        obj.insert(format!("input.query({})", routing.tensor_param), json!(vector));
    }
    if contains_cyrillic(q) {
        obj.insert("language".to_string(), json!("uk"));
    }

    body
}

/// Builds the neighbour-window query for one seed.
///
/// Fetches all messages with `message_id ∈ [start_id, end_id]` in the seed's
/// chat (and thread, when present); when a time window is given, the id
/// window is unioned with it.
pub fn build_neighbor_query(
    chat_id: &str,
    thread_id: Option<i64>,
    start_id: i64,
    end_id: i64,
    time_window: Option<(i64, i64)>,
    hits: usize,
) -> Value {
    let id_clause = format!("(message_id >= {} and message_id <= {})", start_id, end_id);
    let window_clause = match time_window {
        Some((start_ts, end_ts)) => format!(
            "({} or (message_date >= {} and message_date <= {}))",
            id_clause, start_ts, end_ts
        ),
        None => id_clause,
    };

    let mut filters = vec![
        format!("chat_id contains '{}'", escape_yql(chat_id)),
        NOT_DELETED_FILTER.to_string(),
    ];
    if let Some(thread_id) = thread_id {
        filters.push(format!("thread_id = {}", thread_id));
    }

    let yql = format!(
        "select * from sources * where {} and {} order by message_id asc",
        window_clause,
        filters.join(" and ")
    );

    json!({
        "yql": yql,
        "hits": hits,
        "timeout": QUERY_TIMEOUT,
    })
}

/// Aggregation query counting messages per chat.
pub fn build_chat_aggregation_query() -> Value {
    json!({
        "yql": "select chat_id from message where true | all(group(chat_id) each(output(count())))",
        "hits": 0,
    })
}

/// Samples a single document of a chat (used for title lookup).
pub fn build_chat_title_query(chat_id: &str) -> Value {
    json!({
        "yql": format!(
            "select source_title, chat_type from message where chat_id = '{}'",
            escape_yql(chat_id)
        ),
        "hits": 1,
    })
}
