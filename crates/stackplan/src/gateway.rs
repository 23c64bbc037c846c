//! Local gateway emulator: serves the stack's route tree over HTTP.
//!
//! `OPTIONS` answers the fixed preflight response and real integrations
//! answer with a JSON description of the function they would invoke.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Json, Router,
};
use serde_json::json;
use stackplan_core::descriptor::ResourceId;
use stackplan_core::provision::AppliedState;
use stackplan_core::routes::{HttpMethod, Integration, PreflightResponse, RouteNode};
use stackplan_core::Stack;
use thiserror::Error;
use tokio::{net::TcpListener, signal};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Route {path} cannot be served locally: {reason}")]
    UnsupportedPath { path: String, reason: String },
}

/// Converts a route path to the router's syntax: `{id}` stays, a greedy
/// `{proxy+}` becomes `{*proxy}`.
pub fn to_router_path(path: &str) -> Result<String, GatewayError> {
    let unsupported = |reason: &str| GatewayError::UnsupportedPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path == "/" {
        return Ok(path.to_string());
    }

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let last = segments.len() - 1;
    let mut converted = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if !segment.contains(['{', '}']) {
            converted.push(segment.to_string());
            continue;
        }
        let name = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .filter(|s| !s.is_empty() && !s.contains(['{', '}']))
            .ok_or_else(|| unsupported("parameters must span a whole segment"))?;

        match name.strip_suffix('+') {
            Some(greedy) if i == last && !greedy.is_empty() => {
                converted.push(format!("{{*{greedy}}}"))
            }
            Some(_) => return Err(unsupported("a greedy parameter must be the last segment")),
            None => converted.push(format!("{{{name}}}")),
        }
    }

    Ok(format!("/{}", converted.join("/")))
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
        HttpMethod::Head => MethodFilter::HEAD,
        HttpMethod::Options => MethodFilter::OPTIONS,
    }
}

fn is_dynamic(segment: &str) -> bool {
    segment.starts_with('{')
}

/// Sibling parameters with different names cannot share a router position.
fn check_siblings(stack: &Stack) -> Result<(), GatewayError> {
    let nodes = stack.route_tree().nodes();
    for node in nodes {
        let dynamic: Vec<&RouteNode> = node
            .children
            .iter()
            .map(|&i| &nodes[i])
            .filter(|child| is_dynamic(&child.segment))
            .collect();
        if dynamic.len() > 1 {
            return Err(GatewayError::UnsupportedPath {
                path: dynamic[1].path.clone(),
                reason: format!("conflicts with sibling parameter {}", dynamic[0].path),
            });
        }
    }
    Ok(())
}

struct Invocation {
    function: String,
    function_arn: Option<String>,
    route: String,
    method: HttpMethod,
}

fn preflight_response(preflight: &PreflightResponse) -> Response {
    let mut response = StatusCode::from_u16(preflight.status_code)
        .unwrap_or(StatusCode::OK)
        .into_response();
    for (name, value) in &preflight.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

fn method_router(node: &RouteNode, arns: &HashMap<String, String>) -> MethodRouter {
    let mut router = MethodRouter::new();

    for binding in &node.methods {
        let filter = method_filter(binding.method);
        router = match &binding.integration {
            Integration::Function(function) => {
                let invocation = Arc::new(Invocation {
                    function: function.clone(),
                    function_arn: arns.get(function).cloned(),
                    route: node.path.clone(),
                    method: binding.method,
                });
                router.on(filter, move |uri: Uri| {
                    let invocation = invocation.clone();
                    async move {
                        tracing::debug!(
                            function = %invocation.function,
                            path = %uri.path(),
                            "emulated invocation"
                        );
                        Json(json!({
                            "function": invocation.function,
                            "functionArn": invocation.function_arn,
                            "method": invocation.method,
                            "route": invocation.route,
                            "path": uri.path(),
                        }))
                    }
                })
            }
            Integration::Preflight(preflight) => {
                let preflight = Arc::new(preflight.clone());
                router.on(filter, move || {
                    let preflight = preflight.clone();
                    async move { preflight_response(&preflight) }
                })
            }
        };
    }

    router
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Not Found" })),
    )
        .into_response()
}

/// Create the gateway router for a compiled stack.
///
/// Function ARNs are taken from the applied state when present.
pub fn create_gateway(stack: &Stack, state: &AppliedState) -> Result<Router, GatewayError> {
    check_siblings(stack)?;

    let arns: HashMap<String, String> = stack
        .functions()
        .iter()
        .filter_map(|f| {
            state
                .identity(&ResourceId::function(&f.name))
                .and_then(|identity| identity.arn.clone())
                .map(|arn| (f.name.clone(), arn))
        })
        .collect();

    let mut router = Router::new();
    for node in stack.route_tree().nodes() {
        if node.methods.is_empty() {
            continue;
        }
        router = router.route(&to_router_path(&node.path)?, method_router(node, &arns));
    }

    Ok(router
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        )))
}

/// Serves the router until Ctrl+C.
pub async fn serve(app: Router, listener: TcpListener) -> std::io::Result<()> {
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await
        }
    }
}
