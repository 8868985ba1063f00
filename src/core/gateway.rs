//! The metered request client and the signing/payment gateway seam.
//!
//! The gateway collaborator owns wallet signing and nonce bookkeeping; this
//! module only drives it: one signed request per turn, one refresh-and-retry
//! on a stale nonce, and classification of every refusal the node can send
//! back.

use std::error::Error as StdError;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};

use crate::api::{ChatRequest, CostEntry, TokenEnvelope};
use crate::core::config::SessionConfig;
use crate::core::error::TurnError;
use crate::utils::url::aim_url;

type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    Ethereum,
}

impl ChainKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainKind::Ethereum => "ethereum",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletIdentity {
    pub address: String,
    pub chain: ChainKind,
}

impl WalletIdentity {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            chain: ChainKind::Ethereum,
        }
    }
}

/// Fully buffered response from the gateway collaborator. The token
/// endpoint never streams, so status plus body is the whole story.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Capability for producing authenticated requests against a node, signed
/// by the bound wallet identity. Wallet cryptography lives behind this
/// trait; the protocol client treats it as opaque.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn signed_request(
        &self,
        identity: &WalletIdentity,
        node_url: &str,
        slot: &str,
        method: &str,
        action: &str,
        body: String,
    ) -> Result<GatewayResponse, BoxError>;

    /// Whether this gateway can refresh a stale nonce. Gateways without the
    /// capability simply resubmit on retry.
    fn supports_nonce_refresh(&self) -> bool {
        false
    }

    async fn refresh_nonce(
        &self,
        _node_url: &str,
        _identity: &WalletIdentity,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Short-lived credential authorizing one streaming session, plus whatever
/// the node advertised alongside it. Consumed exactly once, never persisted.
#[derive(Debug, Clone)]
pub struct MeteredToken {
    pub token: String,
    pub stream_hint: Option<String>,
    pub costs: Vec<CostEntry>,
}

/// Exchange a chat payload for a streaming token.
///
/// `Ok(None)` means the node answered successfully but granted no token
/// (or the body was not a token envelope at all); the caller takes the
/// non-streaming path. A single nonce-refresh retry is the only automatic
/// recovery; every other failure propagates.
pub async fn request_token(
    gateway: &dyn PaymentGateway,
    identity: &WalletIdentity,
    config: &SessionConfig,
    payload: &ChatRequest,
) -> Result<Option<MeteredToken>, TurnError> {
    let body =
        serde_json::to_string(payload).map_err(|err| TurnError::Network(err.to_string()))?;

    let response = gateway
        .signed_request(
            identity,
            &config.node_url,
            &config.slot,
            "POST",
            &config.action,
            body.clone(),
        )
        .await
        .map_err(|err| TurnError::Network(err.to_string()))?;

    if response.status == StatusCode::PAYMENT_REQUIRED {
        return Err(TurnError::PaymentRequired(response.body));
    }

    if is_rejection(response.status) {
        if !is_stale_nonce(&response.body) {
            return Err(TurnError::Gateway {
                status: response.status,
                body: response.body,
            });
        }

        tracing::debug!("gateway reported a stale nonce; refreshing and resubmitting once");
        if gateway.supports_nonce_refresh() {
            gateway
                .refresh_nonce(&config.node_url, identity)
                .await
                .map_err(|err| TurnError::Network(err.to_string()))?;
        }

        let retry = gateway
            .signed_request(
                identity,
                &config.node_url,
                &config.slot,
                "POST",
                &config.action,
                body,
            )
            .await
            .map_err(|err| TurnError::Network(err.to_string()))?;

        if retry.status.is_success() {
            return Ok(parse_envelope(&retry.body));
        }
        return Err(TurnError::NonceInvalid {
            first: response.body,
            retry: retry.body,
        });
    }

    if !response.status.is_success() {
        return Err(TurnError::Gateway {
            status: response.status,
            body: response.body,
        });
    }

    Ok(parse_envelope(&response.body))
}

fn is_rejection(status: StatusCode) -> bool {
    status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED
}

fn is_stale_nonce(body: &str) -> bool {
    body.to_ascii_lowercase().contains("invalid nonce")
}

fn parse_envelope(body: &str) -> Option<MeteredToken> {
    let envelope = serde_json::from_str::<TokenEnvelope>(body).ok()?;
    let token = envelope.token?;
    Some(MeteredToken {
        token,
        stream_hint: envelope.stream_url,
        costs: envelope.costs,
    })
}

/// Unsigned gateway for nodes that do not enforce request signatures: posts
/// the payload directly with wallet identity headers. Deployments with real
/// payment enforcement supply their own [`PaymentGateway`].
pub struct DirectGateway {
    client: Client,
}

impl DirectGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PaymentGateway for DirectGateway {
    async fn signed_request(
        &self,
        identity: &WalletIdentity,
        node_url: &str,
        slot: &str,
        method: &str,
        action: &str,
        body: String,
    ) -> Result<GatewayResponse, BoxError> {
        let url = aim_url(node_url, slot, action);
        let method = Method::from_bytes(method.as_bytes())?;
        let response = self
            .client
            .request(method, url)
            .header("Content-Type", "application/json")
            .header("tx-sender", &identity.address)
            .header("tx-origin", &identity.address)
            .header("tx-driver", identity.chain.as_str())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok(GatewayResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatMessage;
    use crate::utils::test_support::{start_server, CannedResponse, ScriptedGateway};

    fn config() -> SessionConfig {
        SessionConfig {
            node_url: "https://node:8880".to_string(),
            slot: "0".to_string(),
            action: "/request".to_string(),
            stream_base: "https://node:8880".to_string(),
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }

    fn payload() -> ChatRequest {
        ChatRequest {
            model: "gemma2:2b".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
        }
    }

    fn identity() -> WalletIdentity {
        WalletIdentity::new("0xabc")
    }

    #[tokio::test]
    async fn payment_required_carries_body_verbatim_without_retry() {
        let gateway = ScriptedGateway::new(vec![(402, "balance too low")], true);
        let err = request_token(&gateway, &identity(), &config(), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::PaymentRequired(body) if body == "balance too low"));
        assert_eq!(gateway.request_count(), 1);
        assert_eq!(gateway.refresh_count(), 0);
    }

    #[tokio::test]
    async fn stale_nonce_refreshes_and_retries_exactly_once() {
        let gateway = ScriptedGateway::new(
            vec![
                (400, "Invalid NONCE provided"),
                (200, r#"{"status":"ok","token":"tok-2","costs":[]}"#),
            ],
            true,
        );
        let token = request_token(&gateway, &identity(), &config(), &payload())
            .await
            .unwrap()
            .expect("retry should yield a token");
        assert_eq!(token.token, "tok-2");
        assert_eq!(gateway.request_count(), 2);
        assert_eq!(gateway.refresh_count(), 1);
    }

    #[tokio::test]
    async fn double_nonce_failure_reports_both_bodies() {
        let gateway = ScriptedGateway::new(
            vec![(400, "invalid nonce (a)"), (401, "invalid nonce (b)")],
            false,
        );
        let err = request_token(&gateway, &identity(), &config(), &payload())
            .await
            .unwrap_err();
        match err {
            TurnError::NonceInvalid { first, retry } => {
                assert_eq!(first, "invalid nonce (a)");
                assert_eq!(retry, "invalid nonce (b)");
            }
            other => panic!("expected NonceInvalid, got {other:?}"),
        }
        assert_eq!(gateway.request_count(), 2);
        // No refresh capability, so resubmission happened without one.
        assert_eq!(gateway.refresh_count(), 0);
    }

    #[tokio::test]
    async fn other_rejections_and_server_errors_are_gateway_errors() {
        for (status, body) in [(400u16, "malformed payload"), (500, "boom")] {
            let gateway = ScriptedGateway::new(vec![(status, body)], true);
            let err = request_token(&gateway, &identity(), &config(), &payload())
                .await
                .unwrap_err();
            assert!(matches!(err, TurnError::Gateway { .. }), "status {status}");
            assert_eq!(gateway.request_count(), 1);
        }
    }

    #[tokio::test]
    async fn success_without_token_is_a_soft_miss() {
        for body in [r#"{"status":"ok","content":"inline"}"#, "not json at all"] {
            let gateway = ScriptedGateway::new(vec![(200, body)], true);
            let token = request_token(&gateway, &identity(), &config(), &payload())
                .await
                .unwrap();
            assert!(token.is_none(), "body {body:?}");
        }
    }

    #[tokio::test]
    async fn granted_token_carries_hint_and_costs() {
        let gateway = ScriptedGateway::new(
            vec![(
                200,
                r#"{"status":"ok","token":"tok-1","stream_url":"http://localhost:4001/stream",
                    "costs":[{"currency":"USDC","estimated_cost":0.01,"min":0.0,"max":0.05,"used":0.0}]}"#,
            )],
            true,
        );
        let token = request_token(&gateway, &identity(), &config(), &payload())
            .await
            .unwrap()
            .expect("token should be granted");
        assert_eq!(token.token, "tok-1");
        assert_eq!(
            token.stream_hint.as_deref(),
            Some("http://localhost:4001/stream")
        );
        assert_eq!(token.costs.len(), 1);
        assert_eq!(token.costs[0].currency, "USDC");
    }

    #[tokio::test]
    async fn direct_gateway_posts_identity_headers_to_the_slot_action() {
        let (base, handle) = start_server(vec![CannedResponse::new(
            200,
            r#"{"status":"ok","token":"t","costs":[]}"#,
        )])
        .await;

        let gateway = DirectGateway::new(Client::new());
        let response = gateway
            .signed_request(
                &identity(),
                &base,
                "0",
                "POST",
                "/request",
                "{}".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, "/aim/0/request");
        assert_eq!(requests[0].header("tx-sender"), Some("0xabc"));
        assert_eq!(requests[0].header("tx-driver"), Some("ethereum"));
    }
}
