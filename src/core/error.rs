use std::error::Error as StdError;
use std::fmt;

use reqwest::StatusCode;

/// Everything that can end a turn early.
///
/// Stream negotiation exhausting its candidates is deliberately not here:
/// that is a soft condition recovered by the non-streaming fallback and
/// never surfaced to the user.
#[derive(Debug)]
pub enum TurnError {
    /// The gateway refused the request for lack of funds. Carries the
    /// response body verbatim for display; never retried.
    PaymentRequired(String),

    /// The signed request was rejected for a stale nonce and the single
    /// refresh-and-resubmit retry failed too. Carries both response bodies.
    NonceInvalid { first: String, retry: String },

    /// Any other rejection or server error from the token endpoint.
    Gateway { status: StatusCode, body: String },

    /// Transport-level failure talking to the gateway.
    Network(String),

    /// A stream candidate answered with a real backend error (anything other
    /// than a routing 404), aborting negotiation.
    StreamFailure { status: StatusCode, body: String },

    /// The non-streaming fallback endpoint failed.
    NonStream { status: StatusCode, body: String },

    /// The selected model is not in the current catalog; the turn was
    /// rejected before touching history.
    ModelUnavailable(String),
}

impl TurnError {
    /// Short user-facing alert text for this failure kind.
    pub fn notice(&self) -> String {
        match self {
            TurnError::PaymentRequired(body) => {
                format!("Payment required. Please check your wallet balance. {body}")
            }
            TurnError::NonceInvalid { .. } => {
                "Request rejected twice for an invalid nonce; try reconnecting your wallet."
                    .to_string()
            }
            TurnError::Gateway { status, .. } => format!("Gateway error ({status})"),
            TurnError::Network(msg) => format!("Network error: {msg}"),
            TurnError::StreamFailure { status, .. } => format!("Stream error ({status})"),
            TurnError::NonStream { status, .. } => format!("Chat request failed ({status})"),
            TurnError::ModelUnavailable(model) => format!("Model {model} is not available"),
        }
    }
}

impl fmt::Display for TurnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnError::PaymentRequired(body) => {
                write!(f, "payment required: {body}")
            }
            TurnError::NonceInvalid { first, retry } => {
                write!(f, "invalid nonce after retry: {first}; retry: {retry}")
            }
            TurnError::Gateway { status, body } => {
                write!(f, "gateway error {status}: {body}")
            }
            TurnError::Network(msg) => write!(f, "network error: {msg}"),
            TurnError::StreamFailure { status, body } => {
                write!(f, "stream error {status}: {body}")
            }
            TurnError::NonStream { status, body } => {
                write!(f, "non-stream chat error {status}: {body}")
            }
            TurnError::ModelUnavailable(model) => {
                write!(f, "model {model} is not available")
            }
        }
    }
}

impl StdError for TurnError {}

impl From<reqwest::Error> for TurnError {
    fn from(err: reqwest::Error) -> Self {
        TurnError::Network(err.to_string())
    }
}
