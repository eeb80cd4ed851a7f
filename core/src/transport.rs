//! Executes `HttpRequest` values over the network.
//!
//! # Design
//! `Transport` is the I/O seam between request building and response
//! parsing. The default implementation owns a single `ureq::Agent`, created
//! on first use and shared by every later call on the same transport. The
//! agent sits behind a `OnceLock`, so concurrent first calls race safely and
//! the agent's own connection pool handles reuse across threads.

use std::sync::OnceLock;

use tracing::{debug, warn};
use ureq::Agent;

use crate::error::{ProvisioningError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Performs one HTTP round trip.
///
/// Any status code the server answers with is returned as data. Only a
/// failure to obtain a response is an error, reported as
/// `ProvisioningError::Transport`.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// `Transport` backed by a lazily created, reused `ureq::Agent`.
///
/// TLS is negotiated automatically for `https` URLs.
#[derive(Debug, Default)]
pub struct UreqTransport {
    proxy: Option<String>,
    agent: OnceLock<std::result::Result<Agent, String>>,
}

impl UreqTransport {
    pub fn new(proxy: Option<String>) -> Self {
        Self {
            proxy,
            agent: OnceLock::new(),
        }
    }

    /// The shared agent. An invalid proxy setting is reported here, on first
    /// use, and on every call after that.
    fn agent(&self) -> Result<&Agent> {
        self.agent
            .get_or_init(|| build_agent(self.proxy.as_deref()))
            .as_ref()
            .map_err(ProvisioningError::transport)
    }
}

fn build_agent(proxy: Option<&str>) -> std::result::Result<Agent, String> {
    let proxy = proxy
        .map(ureq::Proxy::new)
        .transpose()
        .map_err(|e| format!("invalid proxy: {e}"))?;
    debug!(proxied = proxy.is_some(), "creating HTTP agent");
    Ok(Agent::config_builder()
        .http_status_as_error(false)
        .proxy(proxy)
        .build()
        .new_agent())
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let agent = self.agent()?;
        let url = request.url.as_str();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => with_headers(agent.get(url), &request.headers).call(),
            HttpMethod::Delete => with_headers(agent.delete(url), &request.headers).call(),
            HttpMethod::Post => {
                let builder = with_headers(agent.post(url), &request.headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
            HttpMethod::Put => {
                let builder = with_headers(agent.put(url), &request.headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| {
            warn!(method = %request.method, url, error = %e, "provisioning request failed in transport");
            ProvisioningError::transport(e)
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        // Error pages are not always UTF-8; only a failed read is a transport error.
        let bytes = response
            .body_mut()
            .read_to_vec()
            .map_err(ProvisioningError::transport)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
