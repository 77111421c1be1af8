//! Home Assistant service-call client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Number, Value};

use super::ServiceCaller;
use crate::config::HomeAssistantConfig;
use crate::directive::{Directive, ParamValue};
use crate::{Error, Result};

/// Payload key carrying the directive target
const TARGET_KEY: &str = "entity_id";

/// Client for the Home Assistant REST API
#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    /// HTTP client
    client: Client,
    /// Base URL, no trailing slash
    base_url: String,
    /// Long-lived access token
    token: SecretString,
    /// Per-call timeout, reported on expiry
    timeout: Duration,
}

impl HomeAssistantClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &HomeAssistantConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: config.timeout,
        })
    }

    /// Service-invocation endpoint for a domain/service pair
    #[must_use]
    pub fn service_url(&self, domain: &str, service: &str) -> String {
        format!("{}/api/services/{domain}/{service}", self.base_url)
    }

    /// Build the JSON body for a directive
    ///
    /// The target goes under `entity_id`; parameters are laid over it and may
    /// replace it.
    ///
    /// # Errors
    ///
    /// Returns error if a float parameter has no JSON representation
    pub fn payload(directive: &Directive) -> Result<Map<String, Value>> {
        let mut body = Map::new();

        if let Some(target) = &directive.target {
            body.insert(TARGET_KEY.to_string(), Value::String(target.clone()));
        }

        for (key, value) in &directive.parameters {
            let value = match value {
                ParamValue::Int(n) => Value::from(*n),
                ParamValue::Float(n) => Number::from_f64(*n).map(Value::Number).ok_or_else(|| {
                    Error::Directive(format!("parameter {key} is not a finite number: {n}"))
                })?,
                ParamValue::Text(text) => Value::String(text.clone()),
            };
            body.insert(key.clone(), value);
        }

        Ok(body)
    }
}

#[async_trait]
impl ServiceCaller for HomeAssistantClient {
    async fn call_service(&self, directive: &Directive) -> Result<()> {
        let url = self.service_url(&directive.domain, &directive.service);
        let body = Self::payload(directive)?;

        tracing::debug!(%url, %directive, "calling service");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(self.timeout)
                } else {
                    Error::Http(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch { status, body });
        }

        Ok(())
    }
}
