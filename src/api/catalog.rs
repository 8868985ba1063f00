//! Hybrid model discovery against an AIM node.
//!
//! Nodes advertise their models in one of two incompatible formats: a
//! LiteLLM-style `/models` endpoint or an Ollama-style `manifest.json`. The
//! resolver probes them in that order and normalizes either into one
//! [`ModelCatalog`]. "No models" is a valid, displayable outcome, not an
//! error.

use reqwest::Client;

use crate::api::{ManifestResponse, ModelsField, ModelsResponse, ProviderIndex};
use crate::core::config::SessionConfig;
use crate::utils::url::aim_url;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelCatalog {
    pub models: Vec<String>,
    pub default_model: Option<String>,
}

impl ModelCatalog {
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|model| model == name)
    }
}

/// Probe the node for its model catalog: `/models` first, `manifest.json`
/// on failure or an empty result. Both failing yields the empty catalog.
pub async fn fetch_catalog(client: &Client, config: &SessionConfig) -> ModelCatalog {
    match fetch_models_phase(client, config).await {
        Some(catalog) if !catalog.is_empty() => return catalog,
        _ => tracing::debug!("models endpoint yielded nothing, probing manifest"),
    }

    fetch_manifest_phase(client, config)
        .await
        .unwrap_or_default()
}

async fn fetch_models_phase(client: &Client, config: &SessionConfig) -> Option<ModelCatalog> {
    let url = aim_url(&config.node_url, &config.slot, "models");
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body = response.json::<ModelsResponse>().await.ok()?;
    Some(catalog_from_models(&body))
}

async fn fetch_manifest_phase(client: &Client, config: &SessionConfig) -> Option<ModelCatalog> {
    let url = aim_url(&config.node_url, &config.slot, "manifest.json");
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body = response.json::<ManifestResponse>().await.ok()?;
    Some(catalog_from_manifest(&body, &config.action))
}

/// Union the `/models` response shapes into one candidate list:
/// keys of the name→provider map, then the flattened provider→names values,
/// then a bare name array. De-duplicated, first occurrence wins.
pub fn catalog_from_models(response: &ModelsResponse) -> ModelCatalog {
    let mut models: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !name.is_empty() && !models.iter().any(|existing| existing == name) {
            models.push(name.to_string());
        }
    };

    if let Some(ModelsField::NameToProvider(map)) = &response.models {
        for name in map.keys() {
            push(name);
        }
    }
    if let Some(ProviderIndex::Grouped(by_provider)) = &response.models_by_provider {
        for names in by_provider.values() {
            if let Some(names) = names.as_array() {
                for name in names.iter().filter_map(|value| value.as_str()) {
                    push(name);
                }
            }
        }
    }
    if let Some(ModelsField::Names(names)) = &response.models {
        for name in names {
            push(name);
        }
    }

    let default_model = response
        .default_model
        .as_ref()
        .filter(|default| models.iter().any(|model| model == *default))
        .cloned();

    ModelCatalog {
        models,
        default_model,
    }
}

/// Extract a catalog from a manifest: the endpoint matching the configured
/// action path wins, else the first advertising models, else the first
/// endpoint. An endpoint with no model list but a declared default yields a
/// one-entry catalog.
pub fn catalog_from_manifest(manifest: &ManifestResponse, action: &str) -> ModelCatalog {
    let endpoint = manifest
        .endpoints
        .iter()
        .find(|endpoint| endpoint.uri.as_deref() == Some(action))
        .or_else(|| {
            manifest
                .endpoints
                .iter()
                .find(|endpoint| !endpoint.available_models.is_empty())
        })
        .or_else(|| manifest.endpoints.first());

    let Some(endpoint) = endpoint else {
        return ModelCatalog::default();
    };

    let declared_default = endpoint
        .defaults
        .as_ref()
        .and_then(|defaults| defaults.model.clone());

    if endpoint.available_models.is_empty() {
        return match declared_default {
            Some(default) => ModelCatalog {
                models: vec![default.clone()],
                default_model: Some(default),
            },
            None => ModelCatalog::default(),
        };
    }

    let models = endpoint.available_models.clone();
    let default_model =
        declared_default.filter(|default| models.iter().any(|model| model == default));
    ModelCatalog {
        models,
        default_model,
    }
}

/// Reconcile the session's selected model with a freshly fetched catalog:
/// keep the current selection if still listed, else take the catalog's
/// declared default, else the first entry.
pub fn reconcile_selection(current: Option<&str>, catalog: &ModelCatalog) -> Option<String> {
    if let Some(current) = current {
        if catalog.contains(current) {
            return Some(current.to_string());
        }
    }
    if let Some(default) = &catalog.default_model {
        return Some(default.clone());
    }
    catalog.models.first().cloned()
}
