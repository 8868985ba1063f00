use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat payload sent to the metered request endpoint and to the
/// non-streaming fallback endpoint.
#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Per-currency cost breakdown advertised alongside a streaming token.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct CostEntry {
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default)]
    pub used: f64,
}

/// Envelope returned by the gateway in exchange for a chat payload.
///
/// `token` is present for streaming sessions; `stream_url` optionally
/// advertises where to open the stream. Nodes that answer inline omit the
/// token and may carry `content` instead.
#[derive(Deserialize, Debug, Default)]
pub struct TokenEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub costs: Vec<CostEntry>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub stream_url: Option<String>,
}

/// One decoded line of the live token stream.
#[derive(Deserialize, Debug)]
pub struct StreamFrame {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

/// `/models` response (LiteLLM-style nodes).
#[derive(Deserialize, Debug, Default)]
pub struct ModelsResponse {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub models: Option<ModelsField>,
    #[serde(default)]
    pub models_by_provider: Option<ProviderIndex>,
}

/// The `models` field arrives either as a bare name array or as a
/// name→provider map. Anything else lands in `Other` and contributes no
/// candidates.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ModelsField {
    Names(Vec<String>),
    NameToProvider(serde_json::Map<String, Value>),
    Other(Value),
}

/// The `models_by_provider` field is a provider→names map when present.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum ProviderIndex {
    Grouped(serde_json::Map<String, Value>),
    Other(Value),
}

/// `manifest.json` response (Ollama-style nodes).
#[derive(Deserialize, Debug, Default)]
pub struct ManifestResponse {
    #[serde(default)]
    pub endpoints: Vec<ManifestEndpoint>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ManifestEndpoint {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub available_models: Vec<String>,
    #[serde(default)]
    pub defaults: Option<EndpointDefaults>,
}

#[derive(Deserialize, Debug, Default)]
pub struct EndpointDefaults {
    #[serde(default)]
    pub model: Option<String>,
}

pub mod catalog;
