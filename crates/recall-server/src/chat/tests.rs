use super::*;

use serde_json::json;

use recall::embed::{EMBED_DIM_SMALL, EMBED_MODEL_SMALL};
use recall::rerank::RerankConfig;
use recall::vespa::IndexClient;
use recall::{MockIndexClient, SearchConfig, StubEmbeddings};

fn engine_with(mock: &MockIndexClient) -> Arc<SearchEngine> {
    let config = SearchConfig {
        neighbor_min_messages: 1,
        ..SearchConfig::default()
    };
    Arc::new(SearchEngine::new(
        Arc::new(mock.clone()) as Arc<dyn IndexClient>,
        Arc::new(StubEmbeddings::new(
            EMBED_MODEL_SMALL.to_string(),
            EMBED_DIM_SMALL,
        )),
        config,
        &RerankConfig::default(),
    ))
}

fn service_with(mock: &MockIndexClient) -> Arc<ChatService> {
    Arc::new(ChatService::new(
        engine_with(mock),
        LlmClient::Stub,
        ChatConfig::default(),
    ))
}

fn seed_hit(chat_id: &str, message_id: i64, text: &str, relevance: f64) -> serde_json::Value {
    json!({
        "relevance": relevance,
        "fields": {
            "id": format!("{}:{}:0:v1", chat_id, message_id),
            "chat_id": chat_id,
            "message_id": message_id,
            "chunk_idx": 0,
            "text": text,
            "message_date": 1_695_759_000,
            "source_title": "Test Chat",
        }
    })
}

fn request(q: &str) -> ChatRequest {
    ChatRequest {
        q: q.to_string(),
        k: 12,
        model_id: None,
        filters: None,
        history: None,
        expansion_level: 0,
    }
}

async fn collect_chunks(service: &Arc<ChatService>, request: ChatRequest) -> Vec<StreamChunk> {
    let mut stream = service.chat_stream(request, "test-user".to_string());
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }
    chunks
}

fn kinds(chunks: &[StreamChunk]) -> Vec<&'static str> {
    chunks.iter().map(StreamChunk::kind).collect()
}

/// Checks the stream grammar:
/// `reformulate? search (start content+ citations end | content end)`.
fn assert_stream_shape(chunks: &[StreamChunk]) {
    let mut kinds = kinds(chunks).into_iter().peekable();

    if kinds.peek() == Some(&"reformulate") {
        kinds.next();
    }
    assert_eq!(kinds.next(), Some("search"), "search chunk must follow");

    match kinds.peek() {
        Some(&"start") => {
            kinds.next();
            let mut content_seen = 0;
            while kinds.peek() == Some(&"content") {
                kinds.next();
                content_seen += 1;
            }
            assert!(content_seen >= 1, "at least one content chunk");
            assert_eq!(kinds.next(), Some("citations"));
            assert_eq!(kinds.next(), Some("end"));
        }
        Some(&"content") => {
            kinds.next();
            assert_eq!(kinds.next(), Some("end"));
        }
        other => panic!("unexpected chunk after search: {:?}", other),
    }
    assert_eq!(kinds.next(), None, "nothing may follow the end chunk");
}

#[tokio::test]
async fn test_full_stream_shape_with_results() {
    let mock = MockIndexClient::new();
    mock.push_search_response(json!({
        "root": { "children": [seed_hit("chat-1", 101, "Flight is at 11:34", 0.9)] }
    }));

    let service = service_with(&mock);
    let chunks = collect_chunks(&service, request("when is the flight?")).await;

    assert_stream_shape(&chunks);
    assert!(chunks.iter().any(|c| matches!(c, StreamChunk::Start { .. })));

    let citations: Vec<_> = chunks
        .iter()
        .filter_map(|c| match c {
            StreamChunk::Citations { citations } => Some(citations.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(citations.len(), 1);
    assert_eq!(citations[0][0].chat_id, "chat-1");
    assert_eq!(citations[0][0].message_id, 101);
}

#[tokio::test]
async fn test_no_data_path() {
    let mock = MockIndexClient::new();
    mock.push_search_response(json!({ "root": { "children": [] } }));

    let service = service_with(&mock);
    let chunks = collect_chunks(&service, request("anything at all")).await;

    assert_stream_shape(&chunks);
    match &chunks[1] {
        StreamChunk::Content { content } => {
            assert!(content.contains("don't see this information"));
        }
        other => panic!("expected the no-data content chunk, got {:?}", other.kind()),
    }
    match chunks.last().unwrap() {
        StreamChunk::End { usage, .. } => {
            assert_eq!(usage.total_tokens, 0);
            assert_eq!(usage.cost_usd, Some(0.0));
        }
        other => panic!("expected end, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_end_chunk_carries_usage_and_timing() {
    let mock = MockIndexClient::new();
    mock.push_search_response(json!({
        "root": { "children": [seed_hit("chat-1", 101, "Flight is at 11:34", 0.9)] }
    }));

    let service = service_with(&mock);
    let chunks = collect_chunks(&service, request("flight?")).await;

    match chunks.last().unwrap() {
        StreamChunk::End {
            usage,
            timing_seconds,
            ..
        } => {
            assert!(usage.prompt_tokens > 0, "local estimation must kick in");
            assert!(usage.completion_tokens > 0);
            assert_eq!(
                usage.total_tokens,
                usage.prompt_tokens + usage.completion_tokens
            );
            assert!(*timing_seconds >= 0.0);
        }
        other => panic!("expected end, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_rate_limit_emits_single_error_chunk() {
    let mock = MockIndexClient::new();
    let service = Arc::new(ChatService::new(
        engine_with(&mock),
        LlmClient::Stub,
        ChatConfig {
            rate_limit_rpm: 1,
            ..ChatConfig::default()
        },
    ));

    // First request is admitted (and runs against an empty index).
    let _ = collect_chunks(&service, request("one")).await;

    let chunks = collect_chunks(&service, request("two")).await;
    assert_eq!(chunks.len(), 1);
    match &chunks[0] {
        StreamChunk::Error {
            content,
            retry_after_seconds,
        } => {
            assert!(content.contains("Rate limit exceeded"));
            assert!(retry_after_seconds.is_some());
        }
        other => panic!("expected error chunk, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_rate_limit_is_per_user() {
    let mock = MockIndexClient::new();
    let service = Arc::new(ChatService::new(
        engine_with(&mock),
        LlmClient::Stub,
        ChatConfig {
            rate_limit_rpm: 1,
            ..ChatConfig::default()
        },
    ));

    let mut first = service.chat_stream(request("one"), "alice".to_string());
    while first.next().await.is_some() {}

    let mut second = service.chat_stream(request("two"), "bob".to_string());
    let mut kinds_seen = Vec::new();
    while let Some(chunk) = second.next().await {
        kinds_seen.push(chunk.kind());
    }
    assert!(!kinds_seen.contains(&"error"), "a different user is not limited");
}

#[tokio::test]
async fn test_reformulation_skipped_without_history() {
    let mock = MockIndexClient::new();
    mock.push_search_response(json!({ "root": { "children": [] } }));

    let service = service_with(&mock);
    let chunks = collect_chunks(&service, request("fresh question")).await;

    assert!(
        !kinds(&chunks).contains(&"reformulate"),
        "no history means no reformulation"
    );
}

#[tokio::test]
async fn test_reformulation_with_history_changes_query() {
    let mock = MockIndexClient::new();
    mock.push_search_response(json!({ "root": { "children": [] } }));

    let service = service_with(&mock);
    let mut req = request("when does it leave?");
    req.history = Some(vec![
        ChatMessage {
            role: "user".to_string(),
            content: "tell me about the flight".to_string(),
        },
        ChatMessage {
            role: "assistant".to_string(),
            content: "the flight is tomorrow".to_string(),
        },
    ]);

    let chunks = collect_chunks(&service, req).await;
    assert_stream_shape(&chunks);
    // The stub LLM always rewrites, so the reformulate chunk is present.
    match &chunks[0] {
        StreamChunk::Reformulate {
            reformulated_query, ..
        } => assert!(!reformulated_query.is_empty()),
        other => panic!("expected reformulate first, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_search_filters_forwarded() {
    let mock = MockIndexClient::new();
    mock.push_search_response(json!({ "root": { "children": [] } }));

    let service = service_with(&mock);
    let mut req = request("query");
    req.filters = Some(ChatFilters {
        chat_ids: Some(vec!["chat-7".to_string(), "chat-8".to_string()]),
        thread_id: Some(3),
    });
    let _ = collect_chunks(&service, req).await;

    let body = &mock.search_bodies()[0];
    let yql = body["yql"].as_str().unwrap();
    assert!(yql.contains("chat_id contains 'chat-7'"), "first chat id is used");
    assert!(yql.contains("thread_id = 3"));
}
