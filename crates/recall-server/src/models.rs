//! Chat model catalogue exposed on `/models`.

use serde::Serialize;

/// One selectable chat model.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelEntry {
    pub label: &'static str,
    pub id: &'static str,
}

/// Single source of truth for the selectable models; the first entry is the
/// default.
pub const AVAILABLE_MODELS: &[ModelEntry] = &[
    ModelEntry {
        label: "gpt 5",
        id: "gpt-5",
    },
    ModelEntry {
        label: "gpt5 mini",
        id: "gpt-5-mini",
    },
    ModelEntry {
        label: "gpt5 nano",
        id: "gpt-5-nano",
    },
];

/// Default model id.
pub const DEFAULT_MODEL_ID: &str = "gpt-5";

/// Resolves a requested model id, falling back to the default for unknown or
/// missing ids.
pub fn resolve_model_id(model_id: Option<&str>) -> &'static str {
    match model_id {
        Some(requested) => AVAILABLE_MODELS
            .iter()
            .find(|m| m.id == requested)
            .map(|m| m.id)
            .unwrap_or(DEFAULT_MODEL_ID),
        None => DEFAULT_MODEL_ID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_first_entry() {
        assert_eq!(AVAILABLE_MODELS[0].id, DEFAULT_MODEL_ID);
    }

    #[test]
    fn test_resolution() {
        assert_eq!(resolve_model_id(None), "gpt-5");
        assert_eq!(resolve_model_id(Some("gpt-5-mini")), "gpt-5-mini");
        assert_eq!(resolve_model_id(Some("made-up")), "gpt-5");
    }
}
