//! Backend endpoint discovery via health probes.
//!
//! The assistant backend may be running on any of a small set of candidate
//! addresses. [`BackendLocator`] probes them in order with a short timeout
//! and caches the first one that reports itself healthy. A cached endpoint
//! is trusted without re-probing until [`invalidate`](BackendLocator::invalidate)
//! is called, which the ask path does after an outright request failure.
//!
//! Total discovery failure is a reported state, not an error: the caller
//! degrades to running without the assistant rather than crashing.

use crate::config::BackendConfig;
use std::fmt;
use tracing::{debug, info, warn};

/// A verified backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL without a trailing slash.
    pub base_url: String,
}

/// Outcome of endpoint resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A healthy endpoint was found (or was already cached).
    Available(Endpoint),
    /// No candidate responded healthy; assistant features are degraded.
    Unavailable,
}

impl Resolution {
    /// Returns `true` if an endpoint was resolved.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Returns the resolved endpoint, if any.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            Self::Available(ep) => Some(ep),
            Self::Unavailable => None,
        }
    }
}

/// Classification of a single candidate probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Candidate responded with a recognized healthy payload.
    Healthy {
        /// Round-trip latency in milliseconds.
        latency_ms: u64,
    },
    /// Candidate responded, but not healthy.
    Unhealthy {
        /// HTTP status code.
        status_code: u16,
        /// Message from the response body, truncated.
        message: String,
    },
    /// Connection refused / unreachable.
    NotRunning,
    /// No response within the probe deadline.
    Timeout,
    /// Candidate responded with something that is not a health payload.
    Malformed {
        /// Description of why the response was not recognized.
        detail: String,
    },
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy { latency_ms } => write!(f, "healthy ({latency_ms}ms)"),
            Self::Unhealthy {
                status_code,
                message,
            } => write!(f, "unhealthy (HTTP {status_code}): {message}"),
            Self::NotRunning => write!(f, "not running (connection refused)"),
            Self::Timeout => write!(f, "timeout (no response)"),
            Self::Malformed { detail } => write!(f, "unrecognized response: {detail}"),
        }
    }
}

/// Discovers and caches a reachable backend endpoint.
pub struct BackendLocator {
    candidates: Vec<String>,
    health_path: String,
    client: reqwest::Client,
    cached: tokio::sync::Mutex<Option<Endpoint>>,
}

impl BackendLocator {
    /// Create a locator from backend configuration.
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.probe_timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            candidates: config.candidates.clone(),
            health_path: config.health_path.clone(),
            client,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the candidate list, in probe order.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Resolve a backend endpoint.
    ///
    /// Returns the cached endpoint when present; otherwise probes each
    /// candidate in order and caches the first healthy one. Individual
    /// candidate failures are non-fatal and move resolution to the next
    /// candidate.
    pub async fn resolve(&self) -> Resolution {
        let mut cached = self.cached.lock().await;
        if let Some(ref endpoint) = *cached {
            return Resolution::Available(endpoint.clone());
        }

        for candidate in &self.candidates {
            match self.probe_candidate(candidate).await {
                EndpointStatus::Healthy { latency_ms } => {
                    info!(%candidate, latency_ms, "backend resolved");
                    let endpoint = Endpoint {
                        base_url: candidate.trim_end_matches('/').to_owned(),
                    };
                    *cached = Some(endpoint.clone());
                    return Resolution::Available(endpoint);
                }
                status => {
                    debug!(%candidate, %status, "candidate not usable");
                }
            }
        }

        warn!("no backend candidate is healthy; assistant features degraded");
        Resolution::Unavailable
    }

    /// Drop the cached endpoint so the next [`resolve`](Self::resolve)
    /// re-probes from scratch.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Probe a single candidate's health endpoint.
    pub async fn probe_candidate(&self, base_url: &str) -> EndpointStatus {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.health_path);

        let start = std::time::Instant::now();
        match self.client.get(&url).send().await {
            Ok(resp) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status_code = resp.status().as_u16();

                if !resp.status().is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    let message = if body.is_empty() {
                        format!("HTTP {status_code}")
                    } else {
                        body.chars().take(200).collect()
                    };
                    return EndpointStatus::Unhealthy {
                        status_code,
                        message,
                    };
                }

                let body = resp.text().await.unwrap_or_default();
                match parse_health_payload(&body) {
                    Some(true) => EndpointStatus::Healthy { latency_ms },
                    Some(false) => EndpointStatus::Unhealthy {
                        status_code,
                        message: "service reports unhealthy status".to_owned(),
                    },
                    None => EndpointStatus::Malformed {
                        detail: "response is not a health payload".to_owned(),
                    },
                }
            }
            Err(e) => classify_request_error(&e),
        }
    }
}

/// Parse a health-check body.
///
/// Returns `Some(true)` for a recognized healthy payload, `Some(false)` for
/// a well-formed payload reporting a non-healthy status, `None` when the
/// body is not a health payload at all. Both `"healthy"` and `"ok"` count
/// as healthy.
fn parse_health_payload(body: &str) -> Option<bool> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let status = json.get("status")?.as_str()?;
    Some(matches!(status, "healthy" | "ok"))
}

/// Classify a transport-level probe failure.
fn classify_request_error(err: &reqwest::Error) -> EndpointStatus {
    if err.is_timeout() {
        EndpointStatus::Timeout
    } else if err.is_connect() {
        EndpointStatus::NotRunning
    } else {
        EndpointStatus::Malformed {
            detail: format!("transport error: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn locator_for(candidates: Vec<String>) -> BackendLocator {
        let config = BackendConfig {
            candidates,
            probe_timeout_ms: 500,
            ..BackendConfig::default()
        };
        BackendLocator::new(&config)
    }

    // ── parse_health_payload ──────────────────────────────────

    #[test]
    fn health_payload_healthy() {
        let body = r#"{"status": "healthy", "services": {"tts": "ready"}}"#;
        assert_eq!(parse_health_payload(body), Some(true));
    }

    #[test]
    fn health_payload_ok() {
        assert_eq!(parse_health_payload(r#"{"status": "ok"}"#), Some(true));
    }

    #[test]
    fn health_payload_error_status() {
        assert_eq!(parse_health_payload(r#"{"status": "error"}"#), Some(false));
    }

    #[test]
    fn health_payload_missing_status() {
        assert!(parse_health_payload(r#"{"version": "1.0"}"#).is_none());
    }

    #[test]
    fn health_payload_not_json() {
        assert!(parse_health_payload("<html>hi</html>").is_none());
    }

    #[test]
    fn health_payload_non_string_status() {
        assert!(parse_health_payload(r#"{"status": 200}"#).is_none());
    }

    // ── Resolution / EndpointStatus ───────────────────────────

    #[test]
    fn resolution_accessors() {
        let available = Resolution::Available(Endpoint {
            base_url: "http://localhost:5001".to_owned(),
        });
        assert!(available.is_available());
        assert_eq!(
            available.endpoint().map(|e| e.base_url.as_str()),
            Some("http://localhost:5001")
        );

        let unavailable = Resolution::Unavailable;
        assert!(!unavailable.is_available());
        assert!(unavailable.endpoint().is_none());
    }

    #[test]
    fn status_display() {
        assert_eq!(
            EndpointStatus::Healthy { latency_ms: 12 }.to_string(),
            "healthy (12ms)"
        );
        assert_eq!(
            EndpointStatus::NotRunning.to_string(),
            "not running (connection refused)"
        );
        assert_eq!(
            EndpointStatus::Timeout.to_string(),
            "timeout (no response)"
        );
        let unhealthy = EndpointStatus::Unhealthy {
            status_code: 503,
            message: "overloaded".to_owned(),
        };
        assert!(unhealthy.to_string().contains("503"));
    }

    // ── Probing ───────────────────────────────────────────────

    #[tokio::test]
    async fn unreachable_candidate_is_not_running_or_timeout() {
        let locator = locator_for(vec!["http://127.0.0.1:19999".to_owned()]);
        let status = locator.probe_candidate("http://127.0.0.1:19999").await;
        assert!(
            matches!(
                status,
                EndpointStatus::NotRunning | EndpointStatus::Timeout
            ),
            "expected NotRunning or Timeout, got: {status}"
        );
    }

    #[tokio::test]
    async fn all_candidates_down_resolves_unavailable() {
        let locator = locator_for(vec![
            "http://127.0.0.1:19998".to_owned(),
            "http://127.0.0.1:19999".to_owned(),
        ]);
        let resolution = locator.resolve().await;
        assert_eq!(resolution, Resolution::Unavailable);
    }

    #[tokio::test]
    async fn empty_candidate_list_resolves_unavailable() {
        let locator = locator_for(Vec::new());
        assert_eq!(locator.resolve().await, Resolution::Unavailable);
    }
}
