//! Error types for the market data service

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification shared by provider and service errors.
///
/// The UI layer switches on this to pick a message, see
/// [`MarketDataError::user_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    ServiceUnavailable,
    NetworkUnreachable,
    MalformedResponse,
    NotFound,
    InvalidRequest,
    Unknown,
}

impl ErrorKind {
    /// A short, kind-appropriate message for end users
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::RateLimited => {
                "Too many requests to the market data provider. Please wait a few minutes and try again."
            }
            ErrorKind::ServiceUnavailable => {
                "The market data provider is currently unavailable. Please try again later."
            }
            ErrorKind::NetworkUnreachable => {
                "Network error. Check your connection or disable ad blockers that may block the API."
            }
            ErrorKind::MalformedResponse => "The market data provider returned unexpected data.",
            ErrorKind::NotFound => "The requested data could not be found.",
            ErrorKind::InvalidRequest => "The request was not valid.",
            ErrorKind::Unknown => "Unable to load data. Please try again later.",
        }
    }
}

/// Which service operation an upstream failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    TopCoins,
    CoinDetail,
    PriceHistory,
    ExchangeRate,
}

impl ResourceKind {
    fn not_found_message(&self) -> &'static str {
        match self {
            ResourceKind::TopCoins => "The coin listing is not available right now.",
            ResourceKind::CoinDetail => "The requested coin could not be found.",
            ResourceKind::PriceHistory => "No price history is available for this coin.",
            ResourceKind::ExchangeRate => "The requested currency is not supported.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::NetworkUnreachable => "network_unreachable",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when fetching or normalizing provider data
///
/// Cloneable so a single failed fetch can be handed to every caller
/// waiting on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Upstream throttled the request
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Upstream reported an outage
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// No response was received
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The payload did not match the expected schema
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Unknown coin, market or currency
    #[error("Not found: {0}")]
    NotFound(String),

    /// Anything else
    #[error("Provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::RateLimited => ErrorKind::RateLimited,
            ProviderError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            ProviderError::NetworkUnreachable(_) => ErrorKind::NetworkUnreachable,
            ProviderError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            ProviderError::NotFound(_) => ErrorKind::NotFound,
            ProviderError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// True for the network-class failures worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited
                | ProviderError::ServiceUnavailable(_)
                | ProviderError::NetworkUnreachable(_)
        )
    }

    /// Creates a MalformedResponse error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Maps a non-success HTTP status to an error kind
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };

        match status.as_u16() {
            429 => ProviderError::RateLimited,
            404 => ProviderError::NotFound(detail),
            500 | 502 | 503 | 504 => ProviderError::ServiceUnavailable(detail),
            _ => ProviderError::Unknown(detail),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Reading a body that breaks off surfaces as a decode error wrapping
        // a body error, so the chain is checked before `is_decode`.
        if is_body_error(&err) {
            ProviderError::NetworkUnreachable(err.to_string())
        } else if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            ProviderError::NetworkUnreachable(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::from_status(status, "")
        } else {
            ProviderError::Unknown(err.to_string())
        }
    }
}

fn is_body_error(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.downcast_ref::<reqwest::Error>().is_some_and(reqwest::Error::is_body) {
            return true;
        }
        source = e.source();
    }
    false
}

/// Errors surfaced to callers of [`MarketDataService`](crate::service::MarketDataService)
///
/// Only returned when no cached value, fresh or stale, could be served.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// Upstream failed and nothing was cached for this resource
    #[error("Failed to load {resource}: {source}")]
    Upstream {
        resource_kind: ResourceKind,
        resource: String,
        #[source]
        source: ProviderError,
    },

    /// Rejected before any network call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MarketDataError {
    /// Creates an Upstream error
    pub fn upstream(
        resource_kind: ResourceKind,
        resource: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        Self::Upstream {
            resource_kind,
            resource: resource.into(),
            source,
        }
    }

    /// Creates an InvalidRequest error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketDataError::Upstream { source, .. } => source.kind(),
            MarketDataError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// A short message for end users
    ///
    /// Same as [`ErrorKind::user_message`], except that `NotFound` names
    /// what was missing: a coin, its history or a currency.
    pub fn user_message(&self) -> &'static str {
        match self {
            MarketDataError::Upstream {
                resource_kind,
                source,
                ..
            } if source.kind() == ErrorKind::NotFound => resource_kind.not_found_message(),
            other => other.kind().user_message(),
        }
    }
}
