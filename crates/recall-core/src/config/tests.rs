use super::*;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.vespa_endpoint, DEFAULT_VESPA_ENDPOINT);
    assert_eq!(config.chunking_version, 1);
    assert_eq!(config.preprocess_version, 1);
    assert_eq!(config.reply_context_tokens, 120);
    assert_eq!(config.target_chunk_tokens, 1000);
    assert_eq!(config.chunk_overlap_tokens, 150);
}

#[test]
fn test_validate_rejects_zero_window() {
    let config = Config {
        target_chunk_tokens: 0,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_overlap_ge_window() {
    let config = Config {
        target_chunk_tokens: 100,
        chunk_overlap_tokens: 100,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_default_config_validates() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_bool_from_env_accepts_common_truthy_forms() {
    // Unique variable names keep this test independent of others.
    unsafe {
        std::env::set_var("RECALL_TEST_BOOL_A", "true");
        std::env::set_var("RECALL_TEST_BOOL_B", "1");
        std::env::set_var("RECALL_TEST_BOOL_C", "off");
    }

    assert!(bool_from_env("RECALL_TEST_BOOL_A", false));
    assert!(bool_from_env("RECALL_TEST_BOOL_B", false));
    assert!(!bool_from_env("RECALL_TEST_BOOL_C", true));
    assert!(bool_from_env("RECALL_TEST_BOOL_UNSET", true));
}

#[test]
fn test_numeric_from_env_falls_back_on_garbage() {
    unsafe {
        std::env::set_var("RECALL_TEST_U64_BAD", "not-a-number");
    }
    assert_eq!(u64_from_env("RECALL_TEST_U64_BAD", 42), 42);
    assert_eq!(u64_from_env("RECALL_TEST_U64_UNSET", 7), 7);
}

#[test]
fn test_require_string_rejects_blank() {
    unsafe {
        std::env::set_var("RECALL_TEST_BLANK", "   ");
    }
    assert!(require_string_from_env("RECALL_TEST_BLANK").is_err());
    assert!(require_string_from_env("RECALL_TEST_NEVER_SET").is_err());
}
