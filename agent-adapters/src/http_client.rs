//! JSON-over-HTTPS client shared by every adapter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agent_config::EndpointSettings;
use hyper::body::{Bytes, to_bytes};
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use hyper::{Body, Client, Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::debug;
use url::form_urlencoded;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::error::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

pub(crate) fn build_https_client() -> HyperClient {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Client::builder().build::<_, Body>(connector)
}

/// Successful response: status was 2xx.
#[derive(Debug)]
pub struct JsonReply {
    headers: HeaderMap,
    body: Bytes,
}

impl JsonReply {
    /// Decodes the body.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Response`] when the body is not valid `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> AdapterResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|err| AdapterError::response(format!("failed to decode response: {err}")))
    }

    /// Returns a response header as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns true when the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Client bound to one base URL with fixed headers and timeout.
#[derive(Clone)]
pub struct JsonClient {
    client: HyperClient,
    base_url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    timeout: Duration,
}

impl fmt::Debug for JsonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl JsonClient {
    /// Creates a client from endpoint settings. A configured key is sent as a
    /// bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for an unusable base URL or key.
    pub fn new(settings: &EndpointSettings) -> AdapterResult<Self> {
        let mut client = Self {
            client: build_https_client(),
            base_url: sanitize_base_url(&settings.base_url)?,
            headers: Vec::new(),
            timeout: settings.timeout(),
        };
        if let Some(key) = &settings.api_key {
            client = client.with_header(AUTHORIZATION.as_str(), &format!("Bearer {key}"))?;
        }
        Ok(client)
    }

    /// Adds a header sent with every request.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] for an invalid name or value.
    pub fn with_header(mut self, name: &str, value: &str) -> AdapterResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| AdapterError::configuration(format!("invalid header name: {err}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| AdapterError::configuration(format!("invalid header value: {err}")))?;
        self.headers.push((name, value));
        Ok(self)
    }

    /// Returns the sanitized base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves `path` against the base URL and appends encoded query pairs.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidRequest`] if the result is not a URI.
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> AdapterResult<Uri> {
        let mut url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        if !query.is_empty() {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            url.push('?');
            url.push_str(&encoded);
        }
        url.parse::<Uri>()
            .map_err(|err| AdapterError::invalid_request(format!("invalid request URI: {err}")))
    }

    /// Sends one request and fails on any non-2xx status.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Transport`] on network failure or timeout and
    /// [`AdapterError::Status`] on a non-success response.
    pub async fn send<B>(
        &self,
        method: Method,
        uri: Uri,
        body: Option<&B>,
        extra_headers: &[(&'static str, &str)],
    ) -> AdapterResult<JsonReply>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = Request::builder().method(method.clone()).uri(uri.clone());
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }

        let payload = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                let bytes = serde_json::to_vec(body).map_err(|err| {
                    AdapterError::invalid_request(format!("failed to encode request: {err}"))
                })?;
                Body::from(bytes)
            }
            None => Body::empty(),
        };

        let request = builder
            .body(payload)
            .map_err(|err| AdapterError::invalid_request(format!("failed to build request: {err}")))?;

        debug!(%method, %uri, "sending request");
        let response = timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| AdapterError::transport(format!("{method} {uri} timed out")))?
            .map_err(|err| AdapterError::transport(format!("{method} {uri} failed: {err}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = timeout(self.timeout, to_bytes(response.into_body()))
            .await
            .map_err(|_| AdapterError::transport(format!("{method} {uri} body timed out")))?
            .map_err(|err| AdapterError::transport(format!("failed to read response: {err}")))?;

        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(JsonReply { headers, body })
    }

    /// POSTs `body` to `path` and decodes the JSON answer.
    ///
    /// # Errors
    ///
    /// See [`JsonClient::send`] and [`JsonReply::decode`].
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> AdapterResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let uri = self.endpoint(path, &[])?;
        self.send(Method::POST, uri, Some(body), &[])
            .await?
            .decode()
    }
}

pub(crate) fn sanitize_base_url(input: &str) -> AdapterResult<String> {
    let mut base = input.trim().to_owned();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(AdapterError::configuration(
            "base URL must start with http:// or https://",
        ));
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base.parse::<Uri>()
        .map_err(|err| AdapterError::configuration(format!("invalid base URL: {err}")))?;
    Ok(base)
}
