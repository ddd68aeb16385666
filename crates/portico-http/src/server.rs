//! Provider role: serving registered functions over HTTP.

use crate::middleware::MiddlewareChain;
use crate::wire::{RequestParts, ResponseParts, WireError};
use crate::{HttpPortal, RegistrationMap};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use portico_core::{PortalError, PortalResult};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

pub(crate) struct ServerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
struct ServerState {
    registrations: RegistrationMap,
    middleware: MiddlewareChain,
    default_timeout: Duration,
    base_path: String,
}

impl HttpPortal {
    /// Bind the listener and serve every registered address. Starting an
    /// already-running server reports the bound socket again.
    pub async fn start_server(&self) -> PortalResult<SocketAddr> {
        let mut guard = self.server.lock().await;
        if guard.is_some() {
            return self.bound_addr().ok_or_else(|| {
                PortalError::transport(self.config.host.clone(), "server state out of sync")
            });
        }

        if self.config.tls {
            // The listener itself stays plain HTTP; `tls` only flips the
            // address scheme for a fronting proxy to terminate.
            warn!("tls is set but the listener serves plain HTTP; https addresses need a terminating proxy");
        }

        let bind_addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| PortalError::Transport {
                address: bind_addr.clone(),
                status: None,
                message: "failed binding listener".to_owned(),
                body: None,
                source: Some(Box::new(e)),
            })?;
        let local = listener.local_addr().map_err(|e| PortalError::Transport {
            address: bind_addr,
            status: None,
            message: "failed reading bound address".to_owned(),
            body: None,
            source: Some(Box::new(e)),
        })?;
        *self.bound.write() = Some(local);

        let state = ServerState {
            registrations: self.registrations.clone(),
            middleware: self.middleware.clone(),
            default_timeout: self.config.default_timeout,
            base_path: self.config.normalized_base_path(),
        };
        let invoke_path = format!("{}/{{name}}/{{id}}", state.base_path);
        let schema_path = format!("{}/{{name}}/{{id}}/schema", state.base_path);
        let app = Router::new()
            .route(&invoke_path, post(invoke))
            .route(&schema_path, get(serve_schema))
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        let (shutdown, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await;
            if let Err(e) = served {
                warn!(error = %e, "portal server exited with error");
            }
        });

        info!(addr = %local, "portal server listening");
        *guard = Some(ServerHandle { shutdown, task });
        Ok(local)
    }

    /// Let in-flight requests drain within `grace`, then force-close.
    /// Idempotent: a second call is a no-op.
    pub async fn stop_server(&self, grace: Duration) {
        let handle = self.server.lock().await.take();
        let Some(ServerHandle { shutdown, mut task }) = handle else {
            return;
        };

        let _ = shutdown.send(());
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            warn!(grace = ?grace, "grace period elapsed; aborting portal server");
            task.abort();
        }
        *self.bound.write() = None;
        info!("portal server stopped");
    }
}

fn error_response(status: u16, message: impl Into<String>) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(WireError::new(status, message))).into_response()
}

fn render(parts: ResponseParts) -> Response {
    let code = StatusCode::from_u16(parts.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(parts.body)).into_response()
}

#[instrument(skip(state, headers, body), fields(name = %name, id = %id))]
async fn invoke(
    State(state): State<ServerState>,
    Path((name, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let key = HttpPortal::registration_key(&name, &id);
    let Some(registration) = state.registrations.read().get(&key).cloned() else {
        return error_response(404, format!("no function registered at {name}/{id}"));
    };

    let Ok(params) = serde_json::from_slice::<Value>(&body) else {
        return error_response(400, "request body is not valid JSON");
    };
    if !params.is_object() {
        return error_response(400, "request body must be a JSON object of named parameters");
    }

    let mut request = RequestParts::post(
        String::new(),
        format!("{}/{}/{}", state.base_path, name, id),
        params,
    );
    for (header_name, header_value) in &headers {
        if let Ok(value) = header_value.to_str() {
            request
                .headers
                .insert(header_name.to_string(), value.to_owned());
        }
    }
    if let Err(e) = state.middleware.apply_request(&mut request) {
        return error_response(400, format!("rejected by middleware: {e}"));
    }
    let params = request.body;

    let outcome = registration.schema.validate_params(&params);
    if !outcome.is_valid() {
        let details = serde_json::to_value(&outcome.issues).unwrap_or(Value::Null);
        let wire = WireError::new(400, "parameter validation failed").with_details(details);
        return (StatusCode::BAD_REQUEST, Json(wire)).into_response();
    }

    // The handler future is dropped if the connection goes away; the
    // portal default timeout bounds it otherwise.
    let executed = tokio::time::timeout(state.default_timeout, (registration.handler)(params)).await;
    let mut parts = match executed {
        Err(_) => {
            let wire = WireError::new(504, "handler exceeded the provider timeout");
            ResponseParts {
                status: 504,
                headers: Default::default(),
                body: serde_json::to_value(&wire).unwrap_or(Value::Null),
            }
        }
        Ok(Err(handler_error)) => {
            let status = handler_error.status.unwrap_or(500);
            let wire = WireError::new(status, handler_error.message);
            ResponseParts {
                status,
                headers: Default::default(),
                body: serde_json::to_value(&wire).unwrap_or(Value::Null),
            }
        }
        Ok(Ok(result)) => {
            let check = registration.schema.validate_result(&result);
            if !check.is_valid() {
                warn!(
                    function = %registration.name,
                    issues = check.issues.len(),
                    "result does not match declared output schema"
                );
            }
            ResponseParts {
                status: 200,
                headers: Default::default(),
                body: result,
            }
        }
    };

    if let Err(e) = state.middleware.apply_response(&mut parts) {
        return error_response(500, format!("response middleware failed: {e}"));
    }
    render(parts)
}

async fn serve_schema(
    State(state): State<ServerState>,
    Path((name, id)): Path<(String, String)>,
) -> Response {
    let key = HttpPortal::registration_key(&name, &id);
    match state.registrations.read().get(&key) {
        Some(registration) => Json(&registration.schema).into_response(),
        None => error_response(404, format!("no function registered at {name}/{id}")),
    }
}
