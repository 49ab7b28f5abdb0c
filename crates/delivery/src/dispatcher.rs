//! Single-attempt HTTP delivery to per-tier workflow endpoints.

use std::{collections::HashMap, fmt, str::FromStr, time::Duration};

use {
    async_trait::async_trait,
    courier_config::DeliveryConfig,
    courier_routing::Tier,
    serde::Serialize,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    payload::WorkflowPayload,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    EndpointError(u16),
    Timeout,
    Unreachable,
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Reason recorded with the fallback copy of an undelivered payload.
    #[must_use]
    pub fn routing_error(self) -> Option<&'static str> {
        match self {
            Self::Delivered => None,
            Self::EndpointError(_) => Some("n8n webhook failed"),
            Self::Timeout => Some("n8n webhook timed out"),
            Self::Unreachable => Some("n8n webhook unreachable"),
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => f.write_str("delivered"),
            Self::EndpointError(status) => write!(f, "endpoint error ({status})"),
            Self::Timeout => f.write_str("timeout"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Sends a payload to the endpoint of a tier.
///
/// Transport failures come back as a [`DeliveryOutcome`]; `Err` is reserved
/// for a tier with no configured endpoint.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, tier: Tier, payload: &WorkflowPayload) -> Result<DeliveryOutcome>;
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    endpoints: HashMap<Tier, String>,
}

impl WebhookDispatcher {
    pub fn new(endpoints: HashMap<Tier, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoints })
    }

    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        let mut endpoints = HashMap::with_capacity(config.endpoints.len());
        for (key, url) in &config.endpoints {
            let tier = Tier::from_str(key).map_err(|e| Error::invalid_endpoint(key, e))?;
            reqwest::Url::parse(url).map_err(|e| Error::invalid_endpoint(key, e))?;
            endpoints.insert(tier, url.clone());
        }
        Self::new(endpoints, Duration::from_secs(config.timeout_secs))
    }

    #[must_use]
    pub fn endpoint(&self, tier: Tier) -> Option<&str> {
        self.endpoints.get(&tier).map(String::as_str)
    }
}

#[async_trait]
impl Dispatch for WebhookDispatcher {
    async fn dispatch(&self, tier: Tier, payload: &WorkflowPayload) -> Result<DeliveryOutcome> {
        let url = self.endpoint(tier).ok_or(Error::MissingEndpoint(tier))?;

        let outcome = match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => DeliveryOutcome::Delivered,
            Ok(resp) => DeliveryOutcome::EndpointError(resp.status().as_u16()),
            Err(e) if e.is_timeout() => {
                warn!(%tier, error = %e, "webhook timed out");
                DeliveryOutcome::Timeout
            },
            Err(e) => {
                warn!(%tier, error = %e, "webhook unreachable");
                DeliveryOutcome::Unreachable
            },
        };
        debug!(%tier, %outcome, messages = payload.message_count(), "dispatched");
        Ok(outcome)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        courier_channels::{ChatKind, RawEvent},
        courier_routing::normalize,
        mockito::Matcher,
        std::collections::BTreeMap,
    };

    fn payload(tier: Tier) -> WorkflowPayload {
        WorkflowPayload::single(
            tier,
            normalize(&RawEvent::text(-1, 2, ChatKind::Group, "can you build it")),
        )
    }

    fn dispatcher(tier: Tier, url: String, timeout: Duration) -> WebhookDispatcher {
        WebhookDispatcher::new(HashMap::from([(tier, url)]), timeout).unwrap()
    }

    #[tokio::test]
    async fn success_status_is_delivered() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/agent")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "workflow_type": "agent",
                "chat_id": -1,
                "text": "can you build it",
            })))
            .with_status(200)
            .create_async()
            .await;

        let d = dispatcher(Tier::Agent, format!("{}/agent", server.url()), DEFAULT_TIMEOUT);
        let outcome = d.dispatch(Tier::Agent, &payload(Tier::Agent)).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_endpoint_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/agent")
            .with_status(500)
            .create_async()
            .await;

        let d = dispatcher(Tier::Agent, format!("{}/agent", server.url()), DEFAULT_TIMEOUT);
        let outcome = d.dispatch(Tier::Agent, &payload(Tier::Agent)).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::EndpointError(500));
        assert_eq!(outcome.routing_error(), Some("n8n webhook failed"));
    }

    #[tokio::test]
    async fn missing_endpoint_is_an_error() {
        let d = WebhookDispatcher::new(HashMap::new(), DEFAULT_TIMEOUT).unwrap();
        let err = d
            .dispatch(Tier::Priority, &payload(Tier::Priority))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingEndpoint(Tier::Priority)));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let d = dispatcher(Tier::Agent, format!("http://{addr}/agent"), DEFAULT_TIMEOUT);
        let outcome = d.dispatch(Tier::Agent, &payload(Tier::Agent)).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Unreachable);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        let hold = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let d = dispatcher(
            Tier::Agent,
            format!("http://{addr}/agent"),
            Duration::from_millis(200),
        );
        let outcome = d.dispatch(Tier::Agent, &payload(Tier::Agent)).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Timeout);
        hold.abort();
    }

    #[test]
    fn from_config_rejects_unknown_tier() {
        let config = DeliveryConfig {
            timeout_secs: 10,
            endpoints: BTreeMap::from([("nope".to_string(), "http://x".to_string())]),
        };
        assert!(matches!(
            WebhookDispatcher::from_config(&config),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn from_config_maps_tier_tags() {
        let config = DeliveryConfig {
            timeout_secs: 10,
            endpoints: BTreeMap::from([(
                "direct_mention".to_string(),
                "http://localhost:5678/webhook/direct".to_string(),
            )]),
        };
        let d = WebhookDispatcher::from_config(&config).unwrap();
        assert_eq!(
            d.endpoint(Tier::DirectMention),
            Some("http://localhost:5678/webhook/direct")
        );
        assert_eq!(d.endpoint(Tier::Agent), None);
    }
}
