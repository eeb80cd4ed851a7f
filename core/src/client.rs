//! Generic request/response adapter for the provisioning API.
//!
//! # Design
//! Every API call funnels through `ResourceClient::perform`, which is split
//! into three steps so each can be exercised alone:
//! - `build_request` turns (verb, resource, query, body) into an
//!   `HttpRequest`: base URI plus resource path, configured headers, Basic
//!   credentials and a JSON body with camel-cased top-level keys.
//! - a `Transport` executes the round trip.
//! - `parse_response` rejects any status outside the configured success set
//!   (`200` by default) and decodes the body into a `Decoded`.
//!
//! Nothing is retried; every failure goes straight back to the caller.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ProvisioningError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::keys::camelize_keys;
use crate::transport::{Transport, UreqTransport};
use crate::types::{Decoded, Params};

/// Synchronous client for the provisioning REST API.
///
/// Cheap to share by reference across threads when `T` is; the default
/// transport reuses one connection pool for the lifetime of the client.
pub struct ResourceClient<T: Transport = UreqTransport> {
    config: ClientConfig,
    authorization: String,
    transport: T,
}

impl<T: Transport> fmt::Debug for ResourceClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceClient<UreqTransport> {
    pub fn new(config: ClientConfig) -> Self {
        let transport = UreqTransport::new(config.proxy().map(str::to_string));
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> ResourceClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        let credentials = format!("{}:{}", config.username(), config.password());
        Self {
            authorization: format!("Basic {}", STANDARD.encode(credentials)),
            config,
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn get(&self, resource: &str, query: &[(&str, &str)]) -> Result<Decoded> {
        self.perform(HttpMethod::Get, resource, query, None)
    }

    pub fn post(&self, resource: &str, body: &Params) -> Result<Decoded> {
        self.perform(HttpMethod::Post, resource, &[], Some(body))
    }

    pub fn put(&self, resource: &str, body: &Params) -> Result<Decoded> {
        self.perform(HttpMethod::Put, resource, &[], Some(body))
    }

    pub fn delete(&self, resource: &str, query: &[(&str, &str)]) -> Result<Decoded> {
        self.perform(HttpMethod::Delete, resource, query, None)
    }

    pub fn perform(
        &self,
        method: HttpMethod,
        resource: &str,
        query: &[(&str, &str)],
        body: Option<&Params>,
    ) -> Result<Decoded> {
        let request = self.build_request(method, resource, query, body)?;
        debug!(method = %request.method, url = %request.url, "dispatching provisioning request");
        let response = self.transport.execute(&request)?;
        self.parse_response(response)
    }

    /// Build the request for `resource` without sending it.
    ///
    /// `resource` is relative to the base URI. `query` pairs are
    /// percent-encoded and appended as `?k=v&k2=v2`. `body` is only used by
    /// POST and PUT, and an empty map sends no payload.
    pub fn build_request(
        &self,
        method: HttpMethod,
        resource: &str,
        query: &[(&str, &str)],
        body: Option<&Params>,
    ) -> Result<HttpRequest> {
        let mut url = format!(
            "{}{}",
            self.config.base_uri(),
            resource.trim_start_matches('/')
        );
        if !query.is_empty() {
            url.push(if url.contains('?') { '&' } else { '?' });
            let pairs: Vec<String> = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect();
            url.push_str(&pairs.join("&"));
        }

        // Basic credentials replace any configured Authorization header.
        let mut headers: Vec<(String, String)> = self
            .config
            .headers()
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("authorization"))
            .cloned()
            .collect();
        headers.push(("Authorization".to_string(), self.authorization.clone()));

        let body = match body {
            Some(params) if method.takes_body() && !params.is_empty() => {
                let camelized = camelize_keys(params.clone());
                Some(
                    serde_json::to_string(&camelized)
                        .map_err(|e| ProvisioningError::Serialize(e.to_string()))?,
                )
            }
            _ => None,
        };

        Ok(HttpRequest {
            method,
            url,
            headers,
            body,
        })
    }

    /// Map a response to its decoded body or to `ProvisioningError::Api`.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Decoded> {
        if !self.config.is_success(response.status) {
            warn!(
                status = response.status,
                reason = %response.reason,
                "provisioning API returned an error status"
            );
            return Err(ProvisioningError::Api {
                status: response.status.to_string(),
                reason: response.reason,
                body: response.body,
            });
        }
        Decoded::from_body(&response.body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    const BASE: &str = "http://localhost:3000/v1/";

    fn config() -> ClientConfig {
        ClientConfig::new("jdoe", "secret").with_base_uri("http://localhost:3000/v1")
    }

    fn client() -> ResourceClient {
        ResourceClient::new(config())
    }

    fn params(value: serde_json::Value) -> Params {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn response(status: u16, reason: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// Replays one canned response and remembers the request it was given.
    struct Canned {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Transport for Canned {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    struct Unreachable;

    impl Transport for Unreachable {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse> {
            Err(ProvisioningError::transport("connection refused"))
        }
    }

    #[test]
    fn get_builds_url_from_base_and_resource() {
        let req = client()
            .build_request(HttpMethod::Get, "applications/108000", &[], None)
            .unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, format!("{BASE}applications/108000"));
        assert!(req.body.is_none());
    }

    #[test]
    fn query_pairs_are_appended() {
        let req = client()
            .build_request(
                HttpMethod::Get,
                "users/",
                &[("username", "foobar"), ("city", "Orlando")],
                None,
            )
            .unwrap();
        assert_eq!(req.url, format!("{BASE}users/?username=foobar&city=Orlando"));
    }

    #[test]
    fn query_values_are_percent_encoded() {
        let req = client()
            .build_request(HttpMethod::Delete, "users", &[("city", "San Francisco")], None)
            .unwrap();
        assert_eq!(req.url, format!("{BASE}users?city=San%20Francisco"));
    }

    #[test]
    fn query_joins_an_existing_query_string() {
        let req = client()
            .build_request(HttpMethod::Get, "users/?city=Orlando", &[("state", "FL")], None)
            .unwrap();
        assert_eq!(req.url, format!("{BASE}users/?city=Orlando&state=FL"));
    }

    #[test]
    fn leading_slash_on_resource_is_ignored() {
        let req = client()
            .build_request(HttpMethod::Get, "/exchanges", &[], None)
            .unwrap();
        assert_eq!(req.url, format!("{BASE}exchanges"));
    }

    #[test]
    fn headers_carry_content_type_and_basic_auth() {
        let req = client()
            .build_request(HttpMethod::Get, "features", &[], None)
            .unwrap();
        assert_eq!(req.header("content-type"), Some("application/json"));
        // base64("jdoe:secret")
        assert_eq!(req.header("Authorization"), Some("Basic amRvZTpzZWNyZXQ="));
    }

    #[test]
    fn configured_authorization_is_replaced_by_basic_credentials() {
        let config = config().with_header("authorization", "Bearer x");
        let req = ResourceClient::new(config)
            .build_request(HttpMethod::Get, "features", &[], None)
            .unwrap();
        let auth: Vec<&str> = req
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(auth, vec!["Basic amRvZTpzZWNyZXQ="]);
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn post_body_keys_are_camel_cased() {
        let body = params(json!({
            "name": "API Test",
            "messaging_url": "http://example.com/sms.rb",
            "voiceUrl": "http://example.com/voice.rb"
        }));
        let req = client()
            .build_request(HttpMethod::Post, "applications", &[], Some(&body))
            .unwrap();
        let sent: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent["messagingUrl"], "http://example.com/sms.rb");
        assert_eq!(sent["voiceUrl"], "http://example.com/voice.rb");
        assert_eq!(sent["name"], "API Test");
        assert!(sent.get("messaging_url").is_none());
    }

    #[test]
    fn empty_body_sends_no_payload() {
        let req = client()
            .build_request(HttpMethod::Post, "applications/1/addresses/number/123", &[], Some(&Params::new()))
            .unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn get_ignores_a_body() {
        let body = params(json!({ "name": "x" }));
        let req = client()
            .build_request(HttpMethod::Get, "applications", &[], Some(&body))
            .unwrap();
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_object_response() {
        let decoded = client()
            .parse_response(response(
                200,
                "OK",
                r#"{"href":"http://host/v1/applications/108000","name":"API Test"}"#,
            ))
            .unwrap();
        let app = decoded.into_object().unwrap();
        assert_eq!(app.len(), 2);
        assert_eq!(app["href"], "http://host/v1/applications/108000");
        assert_eq!(app["name"], "API Test");
    }

    #[test]
    fn parse_array_response() {
        let decoded = client()
            .parse_response(response(200, "OK", r#"[{"prefix":"1407"},{"prefix":"1312"}]"#))
            .unwrap();
        let exchanges = decoded.into_list().unwrap();
        assert_eq!(exchanges.len(), 2);
        assert_eq!(exchanges[1]["prefix"], "1312");
    }

    #[test]
    fn non_200_is_an_api_error() {
        let err = client()
            .parse_response(response(401, "Unauthorized", "Authentication required"))
            .unwrap_err();
        assert_eq!(err.http_status(), Some("401"));
        let message = err.to_string();
        assert!(message.contains("Unauthorized"));
        assert!(message.contains("Authentication required"));
    }

    #[test]
    fn other_2xx_codes_are_errors_by_default() {
        let err = client().parse_response(response(204, "No Content", "")).unwrap_err();
        assert!(matches!(err, ProvisioningError::Api { ref status, .. } if status == "204"));
    }

    #[test]
    fn configured_success_codes_are_accepted() {
        let client = ResourceClient::new(config().with_success_statuses(&[200, 204]));
        let decoded = client.parse_response(response(204, "No Content", "")).unwrap();
        assert_eq!(decoded, Decoded::Empty);
    }

    #[test]
    fn parse_bad_json() {
        let err = client().parse_response(response(200, "OK", "not json")).unwrap_err();
        assert!(matches!(err, ProvisioningError::Decode(_)));
    }

    #[test]
    fn perform_sends_through_the_transport() {
        let transport = Canned {
            response: response(200, "OK", r#"{"href":"http://host/v1/users/12345","confirmationKey":"1234"}"#),
            seen: Mutex::new(Vec::new()),
        };
        let client = ResourceClient::with_transport(config(), transport);
        let body = params(json!({ "first_name": "Count" }));
        let user = client.post("users", &body).unwrap().into_object().unwrap();
        assert_eq!(user["confirmationKey"], "1234");
        assert_eq!(user["href"], "http://host/v1/users/12345");

        let seen = client.transport().seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, HttpMethod::Post);
        assert_eq!(seen[0].url, format!("{BASE}users"));
        assert_eq!(seen[0].body.as_deref(), Some(r#"{"firstName":"Count"}"#));
    }

    #[test]
    fn transport_failure_is_surfaced_with_500() {
        let client = ResourceClient::with_transport(config(), Unreachable);
        let err = client.get("applications", &[]).unwrap_err();
        assert!(matches!(err, ProvisioningError::Transport { .. }));
        assert_eq!(err.http_status(), Some("500"));
        assert!(err.to_string().contains("connection refused"));
    }
}
