//! The conversation session: owns the transcript and drives one turn at a
//! time through token acquisition, stream negotiation, decoding, and the
//! fallback paths.
//!
//! Per turn: `Idle → Sending → (Streaming | NonStreaming) → Idle`, or
//! `→ Errored → Idle` on any failure. The in-flight guard is the only
//! concurrency control and is released on every exit path.

use futures_util::StreamExt;
use reqwest::Client;

use crate::api::catalog::{fetch_catalog, reconcile_selection, ModelCatalog};
use crate::api::{ChatMessage, ChatRequest};
use crate::core::config::SessionConfig;
use crate::core::error::TurnError;
use crate::core::gateway::{request_token, PaymentGateway, WalletIdentity};
use crate::core::message::{ConversationMessage, Role};
use crate::core::negotiate::{non_stream_chat, open_stream};
use crate::core::stream::{FrameDecoder, StreamEvent};

pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, an error occurred while processing your request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The input was blank, a turn was already in flight, or no wallet is
    /// bound. Nothing happened and nothing is surfaced.
    Ignored,
    /// The reply arrived over a live stream.
    Streamed,
    /// The reply came from the non-streaming chat endpoint in one shot.
    Fallback,
}

pub struct ChatSession<G> {
    client: Client,
    gateway: G,
    config: SessionConfig,
    identity: Option<WalletIdentity>,
    messages: Vec<ConversationMessage>,
    catalog: ModelCatalog,
    model: Option<String>,
    in_flight: bool,
}

impl<G: PaymentGateway> ChatSession<G> {
    pub fn new(client: Client, gateway: G, config: SessionConfig) -> Self {
        Self {
            client,
            gateway,
            config,
            identity: None,
            messages: Vec::new(),
            catalog: ModelCatalog::default(),
            model: None,
            in_flight: false,
        }
    }

    pub fn bind_wallet(&mut self, identity: WalletIdentity) {
        self.identity = Some(identity);
    }

    pub fn wallet(&self) -> Option<&WalletIdentity> {
        self.identity.as_ref()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Re-discover the node's models and swap the catalog in wholesale,
    /// reconciling the current selection against the new list.
    pub async fn refresh_catalog(&mut self) -> &ModelCatalog {
        let catalog = fetch_catalog(&self.client, &self.config).await;
        self.install_catalog(catalog);
        &self.catalog
    }

    /// Atomic catalog replacement plus selection reconciliation: keep the
    /// current model if still served, else the catalog default, else the
    /// first entry.
    pub fn install_catalog(&mut self, catalog: ModelCatalog) {
        self.model = reconcile_selection(self.model.as_deref(), &catalog);
        self.catalog = catalog;
    }

    /// Run one turn. `on_token` observes each streamed increment as it is
    /// folded into the live reply; the fallback path delivers the reply in
    /// one piece without invoking it.
    pub async fn send_message<F>(
        &mut self,
        content: &str,
        mut on_token: F,
    ) -> Result<TurnOutcome, TurnError>
    where
        F: FnMut(&str),
    {
        let trimmed = content.trim();
        if trimmed.is_empty() || self.in_flight {
            return Ok(TurnOutcome::Ignored);
        }
        let Some(identity) = self.identity.clone() else {
            return Ok(TurnOutcome::Ignored);
        };

        // Model membership is checked before history is touched, so a
        // rejected turn leaves no trace in the transcript.
        let model = match self.model.clone() {
            Some(model) if self.catalog.contains(&model) => model,
            other => {
                return Err(TurnError::ModelUnavailable(other.unwrap_or_default()));
            }
        };

        self.in_flight = true;
        self.messages.push(ConversationMessage::user(trimmed));
        self.messages
            .push(ConversationMessage::streaming_placeholder());

        let payload = self.build_payload(&model);
        let result = self.run_turn(&identity, &payload, &mut on_token).await;
        match &result {
            Ok(_) => self.finalize_reply(),
            Err(err) => self.fail_reply(err),
        }
        self.in_flight = false;
        result
    }

    async fn run_turn<F>(
        &mut self,
        identity: &WalletIdentity,
        payload: &ChatRequest,
        on_token: &mut F,
    ) -> Result<TurnOutcome, TurnError>
    where
        F: FnMut(&str),
    {
        let grant = request_token(&self.gateway, identity, &self.config, payload).await?;

        if let Some(token) = grant {
            let stream = open_stream(
                &self.client,
                &self.config.stream_base,
                &token.token,
                token.stream_hint.as_deref(),
            )
            .await?;

            if let Some(response) = stream {
                let mut body = response.bytes_stream();
                let mut decoder = FrameDecoder::new();
                while let Some(chunk) = body.next().await {
                    let chunk = chunk.map_err(|err| TurnError::Network(err.to_string()))?;
                    for event in decoder.push_chunk(&chunk) {
                        match event {
                            StreamEvent::Token(text) => {
                                on_token(&text);
                                self.append_to_reply(&text);
                            }
                            // Recognized but deliberately without effect;
                            // the channel ends when the body does.
                            StreamEvent::Done => {}
                        }
                    }
                }
                return Ok(TurnOutcome::Streamed);
            }
            tracing::debug!("no stream endpoint available, using non-streaming chat");
        }

        let reply = non_stream_chat(&self.client, &self.config, payload).await?;
        self.replace_reply(reply);
        Ok(TurnOutcome::Fallback)
    }

    /// System prompt plus the whole transcript up to (not including) the
    /// placeholder that is being filled.
    fn build_payload(&self, model: &str) -> ChatRequest {
        let mut messages = vec![ChatMessage {
            role: Role::System.as_str().to_string(),
            content: self.config.system_prompt.clone(),
        }];
        for message in &self.messages[..self.messages.len().saturating_sub(1)] {
            messages.push(ChatMessage {
                role: message.role.as_str().to_string(),
                content: message.content.clone(),
            });
        }
        ChatRequest {
            model: model.to_string(),
            messages,
        }
    }

    fn append_to_reply(&mut self, text: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role.is_assistant() && last.is_streaming {
                last.content.push_str(text);
            }
        }
    }

    fn replace_reply(&mut self, reply: String) {
        if let Some(last) = self.messages.last_mut() {
            if last.role.is_assistant() {
                last.content = reply;
                last.is_streaming = false;
            }
        }
    }

    fn finalize_reply(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            if last.role.is_assistant() {
                last.is_streaming = false;
            }
        }
    }

    fn fail_reply(&mut self, err: &TurnError) {
        tracing::debug!("turn failed: {err}");
        if let Some(last) = self.messages.last_mut() {
            if last.role.is_assistant() {
                last.content = GENERIC_FAILURE_MESSAGE.to_string();
                last.is_streaming = false;
                last.error = true;
            }
        }
    }

    #[cfg(test)]
    fn set_in_flight_for_test(&mut self, value: bool) {
        self.in_flight = value;
    }
}
