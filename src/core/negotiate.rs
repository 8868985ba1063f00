//! Stream channel negotiation.
//!
//! A granted token can usually be redeemed at more than one place: the URL
//! the node advertised, the canonical `/chat` path, or one of two legacy
//! paths. Candidates are tried in that fixed order; a 404 or transport error
//! means "wrong door, try the next", while any other failure is a real
//! backend error and aborts the turn. Exhausting every candidate is soft —
//! the caller falls back to the non-streaming chat endpoint.

use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};

use crate::api::ChatRequest;
use crate::core::config::SessionConfig;
use crate::core::error::TurnError;
use crate::utils::url::{aim_url, join_url, rewrite_stream_hint};

/// Ordered candidate endpoints for redeeming a streaming token. The
/// advertised hint is rewritten onto our stream base first; unparseable
/// hints are skipped.
pub fn candidate_urls(stream_base: &str, hint: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(hint) = hint {
        match rewrite_stream_hint(stream_base, hint) {
            Some(rewritten) => candidates.push(rewritten),
            None => tracing::debug!("ignoring unparseable stream hint: {hint}"),
        }
    }
    candidates.push(join_url(stream_base, "chat"));
    candidates.push(join_url(stream_base, "stream/chat"));
    candidates.push(join_url(stream_base, "stream"));
    candidates
}

/// Try to open the token-authorized stream. `Ok(None)` means every candidate
/// missed and the caller should fall back to the non-streaming call.
pub async fn open_stream(
    client: &Client,
    stream_base: &str,
    token: &str,
    hint: Option<&str>,
) -> Result<Option<Response>, TurnError> {
    for url in candidate_urls(stream_base, hint) {
        match client.post(&url).json(&json!({ "token": token })).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("stream channel opened at {url}");
                return Ok(Some(response));
            }
            Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                tracing::debug!("stream candidate {url} missed (404)");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(TurnError::StreamFailure { status, body });
            }
            Err(err) => {
                tracing::debug!("stream candidate {url} unreachable: {err}");
            }
        }
    }
    Ok(None)
}

/// Non-streaming fallback: post the full chat payload to the slot's chat
/// endpoint and extract the complete reply in one shot.
pub async fn non_stream_chat(
    client: &Client,
    config: &SessionConfig,
    payload: &ChatRequest,
) -> Result<String, TurnError> {
    let url = aim_url(&config.node_url, &config.slot, "chat");
    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(TurnError::NonStream { status, body });
    }
    Ok(extract_reply(&body))
}

/// Accept any of the reply shapes nodes are known to produce: a bare JSON
/// string, `{content}`, an OpenAI-style choices array, any other JSON
/// re-serialized, or plain text.
pub fn extract_reply(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(text)) => text,
        Ok(value) => {
            if let Some(content) = value.get("content").and_then(Value::as_str) {
                return content.to_string();
            }
            if let Some(content) = value
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
            {
                return content.to_string();
            }
            value.to_string()
        }
        Err(_) => body.to_string(),
    }
}
