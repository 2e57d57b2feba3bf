//! Provider roles and cost tiers shared by the router and the controller

use serde::{Deserialize, Serialize};

/// Role a provider plays in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRole {
    Transcriber,
    Responder,
    Synthesizer,
}

impl ProviderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRole::Transcriber => "transcriber",
            ProviderRole::Responder => "responder",
            ProviderRole::Synthesizer => "synthesizer",
        }
    }
}

impl std::fmt::Display for ProviderRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cost/quality tier of a provider, ordered cheapest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Economy,
    #[default]
    Standard,
    Premium,
}
