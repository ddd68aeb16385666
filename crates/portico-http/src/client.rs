//! Consumer role: calling a self-describing network address.

use crate::middleware::MiddlewareChain;
use crate::wire::{RequestParts, ResponseParts, WireError};
use crate::HttpPortalConfig;
use async_trait::async_trait;
use portico_core::{Address, CallContext, Function, PortalError, PortalResult};
use portico_schema::FunctionSchema;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

pub(crate) struct HttpFunction {
    address: Address,
    url: url::Url,
    schema: FunctionSchema,
    client: reqwest::Client,
    config: HttpPortalConfig,
    middleware: MiddlewareChain,
}

impl HttpFunction {
    pub(crate) fn new(
        address: Address,
        url: url::Url,
        schema: FunctionSchema,
        client: reqwest::Client,
        config: HttpPortalConfig,
        middleware: MiddlewareChain,
    ) -> Self {
        Self {
            address,
            url,
            schema,
            client,
            config,
            middleware,
        }
    }

    fn transport_error(
        &self,
        status: Option<u16>,
        message: impl Into<String>,
        body: Option<String>,
        source: Option<portico_core::BoxError>,
    ) -> PortalError {
        PortalError::Transport {
            address: self.address.as_str().to_owned(),
            status,
            message: message.into(),
            body,
            source,
        }
    }

    /// One network attempt. The boolean marks the failure as retryable:
    /// network-level failures and 502/503/504 only.
    async fn attempt(
        &self,
        request: &RequestParts,
        limit: Duration,
    ) -> Result<Value, (PortalError, bool)> {
        let url = url::Url::parse(&format!("{}{}", request.base_url, request.path)).map_err(
            |e| {
                (
                    PortalError::address(format!("{}{}", request.base_url, request.path), e.to_string()),
                    false,
                )
            },
        )?;

        let method: reqwest::Method = request.method.parse().map_err(|_| {
            (
                self.transport_error(
                    None,
                    format!("invalid request method `{}`", request.method),
                    None,
                    None,
                ),
                false,
            )
        })?;
        let mut builder = self
            .client
            .request(method, url)
            .timeout(limit)
            .json(&request.body);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = &request.auth {
            builder = builder.bearer_auth(token);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err((PortalError::Timeout { limit }, false)),
            Err(e) => {
                return Err((
                    self.transport_error(None, "network failure", None, Some(Box::new(e))),
                    true,
                ));
            }
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_owned()))
            })
            .collect();
        let body_text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return Err((
                    self.transport_error(
                        Some(status),
                        "failed reading response body",
                        None,
                        Some(Box::new(e)),
                    ),
                    true,
                ));
            }
        };

        let decoded: Result<Value, _> = serde_json::from_str(&body_text);
        let mut parts = ResponseParts {
            status,
            headers,
            body: decoded.as_ref().cloned().unwrap_or(Value::Null),
        };
        self.middleware
            .apply_response(&mut parts)
            .map_err(|e| (e, false))?;

        if (200..300).contains(&parts.status) {
            return match decoded {
                Ok(_) => Ok(parts.body),
                Err(e) => Err((
                    self.transport_error(
                        Some(parts.status),
                        "response body is not valid JSON",
                        Some(body_text),
                        Some(Box::new(e)),
                    ),
                    false,
                )),
            };
        }

        let retryable = matches!(parts.status, 502 | 503 | 504);
        let message = serde_json::from_str::<WireError>(&body_text)
            .map(|wire| wire.error)
            .unwrap_or_else(|_| format!("server responded with status {status}"));
        Err((
            self.transport_error(Some(parts.status), message, Some(body_text), None),
            retryable,
        ))
    }
}

#[async_trait]
impl Function for HttpFunction {
    #[instrument(skip(self, ctx, params), fields(address = %self.address))]
    async fn call(&self, ctx: &CallContext, params: Value) -> PortalResult<Value> {
        let outcome = self.schema.validate_params(&params);
        if !outcome.is_valid() {
            return Err(PortalError::invalid_params(outcome.issues));
        }

        let limit = ctx.effective_timeout(self.config.default_timeout);
        let mut request = RequestParts::post(
            self.url.origin().ascii_serialization(),
            self.url.path().to_owned(),
            params,
        );
        self.middleware.apply_request(&mut request)?;

        let mut attempt = 0_u32;
        let result = loop {
            attempt += 1;
            match self.attempt(&request, limit).await {
                Ok(value) => break value,
                Err((error, retryable)) => {
                    if retryable && attempt <= self.config.max_retries {
                        debug!(attempt, error = %error, "retrying after retryable failure");
                        sleep(self.config.retry_delay).await;
                        continue;
                    }
                    return Err(error);
                }
            }
        };

        let check = self.schema.validate_result(&result);
        if !check.is_valid() {
            warn!(
                address = %self.address,
                issues = check.issues.len(),
                "result does not match declared output schema"
            );
        }
        Ok(result)
    }

    fn schema(&self) -> &FunctionSchema {
        &self.schema
    }

    fn address(&self) -> &Address {
        &self.address
    }
}

/// Fetch the schema a provider serves next to the function address.
pub(crate) async fn fetch_schema(
    client: &reqwest::Client,
    address: &Address,
    config: &HttpPortalConfig,
) -> PortalResult<FunctionSchema> {
    let url = format!("{}/schema", address.as_str());
    let response = client
        .get(&url)
        .timeout(config.default_timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                PortalError::Timeout {
                    limit: config.default_timeout,
                }
            } else {
                PortalError::Transport {
                    address: address.as_str().to_owned(),
                    status: None,
                    message: "failed fetching remote schema".to_owned(),
                    body: None,
                    source: Some(Box::new(e)),
                }
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(PortalError::Transport {
            address: address.as_str().to_owned(),
            status: Some(status.as_u16()),
            message: "remote schema unavailable".to_owned(),
            body: response.text().await.ok(),
            source: None,
        });
    }

    response.json::<FunctionSchema>().await.map_err(|e| {
        PortalError::Transport {
            address: address.as_str().to_owned(),
            status: Some(status.as_u16()),
            message: "remote schema is not valid JSON".to_owned(),
            body: None,
            source: Some(Box::new(e)),
        }
    })
}
