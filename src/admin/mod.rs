// src/admin/mod.rs
//! HTTP control plane: shows the registry and applies toggle batches.

mod form;

pub use form::ToggleForm;

use crate::error::ProxyError;
use crate::metrics::MetricsRegistry;
use crate::proxy::Proxy;
use crate::registry::BackendDescriptor;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Body, Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{debug, info};

pub async fn handle(
    req: Request<Body>,
    proxy: Arc<Proxy>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Body>, ProxyError> {
    info!("serve: {}", req.uri().path());

    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => Ok(with_content_type(
            Response::new(Body::from(metrics.gather())),
            "text/plain; version=0.0.4",
        )),
        (&Method::GET, "/") | (&Method::POST, "/") => serve_index(req, proxy).await,
        _ => Ok(status_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

async fn serve_index(req: Request<Body>, proxy: Arc<Proxy>) -> Result<Response<Body>, ProxyError> {
    let query = req.uri().query().map(str::to_owned);
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("failed to read admin request body: {}", e);
            return Ok(status_response(StatusCode::BAD_REQUEST, "Bad Request"));
        }
    };
    let form = ToggleForm::parse(query.as_deref(), &body);

    let backends = if form.is_update() {
        let len = proxy.registry().len().await;
        proxy.reconfigure(&form.toggles(len)).await
    } else {
        proxy.registry().snapshot().await
    };

    if form.wants_json() {
        let json = render_json(&backends)?;
        Ok(with_content_type(
            Response::new(Body::from(json)),
            "application/json",
        ))
    } else {
        Ok(with_content_type(
            Response::new(Body::from(render_html(&backends))),
            "text/html; charset=utf-8",
        ))
    }
}

/// The registry as a JSON array of `{host, active, default}`.
pub fn render_json(backends: &[BackendDescriptor]) -> Result<Vec<u8>, ProxyError> {
    Ok(serde_json::to_vec(backends)?)
}

/// Bare form with one pair of checkboxes per backend.
pub fn render_html(backends: &[BackendDescriptor]) -> String {
    let mut html = String::from(
        "<html>\n<head><title>fanout proxy</title></head>\n<body>\n<form method=\"post\">\n\
         <input type=\"hidden\" name=\"apply\" value=\"1\"/>\n<ul>\n",
    );
    for (idx, backend) in backends.iter().enumerate() {
        html.push_str(&format!(
            "<li>{host} \
             active <input name=\"active[{idx}]\" type=\"checkbox\" value=\"1\"{active}/> \
             default <input name=\"default[{idx}]\" type=\"checkbox\" value=\"1\"{default}/></li>\n",
            host = escape(backend.host()),
            idx = idx,
            active = checked(backend.is_active()),
            default = checked(backend.is_default()),
        ));
    }
    html.push_str("</ul>\n<input type=\"submit\" value=\"update\"/>\n</form>\n</body>\n</html>\n");
    html
}

fn checked(on: bool) -> &'static str {
    if on {
        " checked=\"checked\""
    } else {
        ""
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

fn with_content_type(mut response: Response<Body>, content_type: &'static str) -> Response<Body> {
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn status_response(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}

// Convert ProxyError to a Hyper response for the admin interface
impl From<ProxyError> for Response<Body> {
    fn from(err: ProxyError) -> Self {
        let (status, message) = match err {
            ProxyError::AdminSerialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "JSON marshalling failed")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
        };
        status_response(status, message)
    }
}
