//! Public model aliases and their upstream identifiers
//!
//! Clients address models by short OpenAI-style names. The upstream expects
//! its own internal identifiers, so every inbound `model` field goes through
//! [`convert_model`] before a request is sent.

use std::fmt;

/// Model alias exposed on `/v1/models`
///
/// Parsing is case-insensitive and total: anything unrecognized becomes
/// [`ModelAlias::Gpt4oMini`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModelAlias {
    #[default]
    Gpt4oMini,
    Claude3Haiku,
    Llama33_70b,
    MistralSmall,
    O3Mini,
}

impl ModelAlias {
    /// Every alias in the order advertised by `/v1/models`
    pub const ALL: [ModelAlias; 5] = [
        ModelAlias::Gpt4oMini,
        ModelAlias::Claude3Haiku,
        ModelAlias::Llama33_70b,
        ModelAlias::MistralSmall,
        ModelAlias::O3Mini,
    ];

    /// Resolve a client-supplied model name
    pub fn resolve(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "claude-3-haiku" => ModelAlias::Claude3Haiku,
            "llama-3.3-70b" => ModelAlias::Llama33_70b,
            "mistral-small" => ModelAlias::MistralSmall,
            "o3-mini" => ModelAlias::O3Mini,
            _ => ModelAlias::Gpt4oMini,
        }
    }

    /// Public alias name
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelAlias::Gpt4oMini => "gpt-4o-mini",
            ModelAlias::Claude3Haiku => "claude-3-haiku",
            ModelAlias::Llama33_70b => "llama-3.3-70b",
            ModelAlias::MistralSmall => "mistral-small",
            ModelAlias::O3Mini => "o3-mini",
        }
    }

    /// Identifier the upstream chat endpoint expects
    pub fn upstream_id(&self) -> &'static str {
        match self {
            ModelAlias::Gpt4oMini => "gpt-4o-mini",
            ModelAlias::Claude3Haiku => "claude-3-haiku-20240307",
            ModelAlias::Llama33_70b => "meta-llama/Llama-3.3-70B-Instruct-Turbo",
            ModelAlias::MistralSmall => "mistralai/Mistral-Small-24B-Instruct-2501",
            ModelAlias::O3Mini => "o3-mini",
        }
    }
}

impl fmt::Display for ModelAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a client-supplied model name to the upstream identifier
pub fn convert_model(name: &str) -> &'static str {
    ModelAlias::resolve(name).upstream_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_aliases_map_to_upstream_ids() {
        assert_eq!(convert_model("claude-3-haiku"), "claude-3-haiku-20240307");
        assert_eq!(
            convert_model("llama-3.3-70b"),
            "meta-llama/Llama-3.3-70B-Instruct-Turbo"
        );
        assert_eq!(
            convert_model("mistral-small"),
            "mistralai/Mistral-Small-24B-Instruct-2501"
        );
        assert_eq!(convert_model("o3-mini"), "o3-mini");
        assert_eq!(convert_model("gpt-4o-mini"), "gpt-4o-mini");
    }

    #[test]
    fn test_mapping_is_case_insensitive() {
        assert_eq!(convert_model("Claude-3-HAIKU"), "claude-3-haiku-20240307");
        assert_eq!(convert_model("O3-MINI"), "o3-mini");
    }

    #[test]
    fn test_unknown_alias_falls_back_to_default() {
        assert_eq!(convert_model("gpt-4"), "gpt-4o-mini");
        assert_eq!(convert_model(""), "gpt-4o-mini");
        assert_eq!(convert_model("claude-3-haiku-20240307"), "gpt-4o-mini");
    }

    #[test]
    fn test_all_aliases_round_trip_through_resolve() {
        for alias in ModelAlias::ALL {
            assert_eq!(ModelAlias::resolve(alias.as_str()), alias);
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        for name in ["mistral-small", "MISTRAL-small", "whatever"] {
            assert_eq!(convert_model(name), convert_model(name));
        }
    }
}
