//! # gRPC-Web Client
//!
//! Performs unary gRPC-Web calls over plain HTTP(S) with `reqwest`. It is agnostic to the
//! messages being exchanged: the [`ProtoSchema`] handed to [`GrpcWebClient::invoke`]
//! provides the request type used to encode JSON payloads.
//!
//! ## Features
//!
//! * **Dynamic Pathing**: Builds `{base_url}/package.Service/Method` at runtime.
//! * **Wire variants**: Binary (`application/grpc-web+proto`) or base64 text
//!   (`application/grpc-web-text`) framing, chosen per request.
//! * **Status extraction**: `grpc-status`/`grpc-message` are read from the response
//!   headers. When the header is absent the trailer frame of the body is consulted, and
//!   when neither carries a status the call is considered OK.
//!
//! The client performs no retries. Connection failures and timeouts are returned as
//! [`InvokeError::Transport`]. Once the server has answered, the exchange always yields a
//! [`GrpcWebResponse`], even when its body cannot be read as gRPC-Web.
use super::frame::{self, Trailers};
use super::types::{GrpcWebRequest, GrpcWebResponse, RequestPayload};
use crate::codec::EncodeError;
use crate::config::ClientConfig;
use crate::schema::ProtoSchema;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use prost::Message;
use reqwest::header::{
    ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, InvalidHeaderName,
    InvalidHeaderValue, USER_AGENT,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const CONTENT_TYPE_PROTO: &str = "application/grpc-web+proto";
pub const CONTENT_TYPE_TEXT: &str = "application/grpc-web-text";

const USER_AGENT_VALUE: &str = concat!("grpcweb/", env!("CARGO_PKG_VERSION"));
const X_GRPC_WEB: HeaderName = HeaderName::from_static("x-grpc-web");

const GRPC_STATUS_OK: i32 = 0;
const GRPC_STATUS_UNKNOWN: i32 = 2;

#[derive(thiserror::Error, Debug)]
pub enum InvokeError {
    #[error("Failed to build the HTTP client: '{0}'")]
    ClientBuild(#[source] reqwest::Error),
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),
    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { service: String, method: String },
    #[error("Failed to encode request: {0}")]
    Encode(#[from] EncodeError),
    #[error("Invalid header key '{key}': '{source}'")]
    InvalidHeaderKey {
        key: String,
        source: InvalidHeaderName,
    },
    #[error("Invalid header value for key '{key}': '{source}'")]
    InvalidHeaderValue {
        key: String,
        source: InvalidHeaderValue,
    },
    #[error("Request to '{url}' failed: '{source}'")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A unary gRPC-Web client bound to one base URL.
///
/// Cloning is cheap and clones share the underlying connection pool, so one client can be
/// used from many tasks at once.
#[derive(Debug, Clone)]
pub struct GrpcWebClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GrpcWebClient {
    /// Creates a client for `base_url`. A single trailing `/` is stripped.
    ///
    /// `timeout` bounds both connection establishment and each whole call.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, InvokeError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(InvokeError::ClientBuild)?;

        let base_url = base_url.strip_suffix('/').unwrap_or(base_url).to_string();

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, InvokeError> {
        Self::new(&config.base_url, config.timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The full URL `request` is sent to.
    pub fn url_for(&self, request: &GrpcWebRequest) -> String {
        format!("{}{}", self.base_url, request.path())
    }

    /// Performs a unary gRPC-Web call.
    ///
    /// JSON payloads are encoded with the method's request type from `schema`. When the
    /// schema is degraded (no descriptors) the JSON text is sent verbatim as the frame
    /// payload: this keeps the call going but is not valid Protobuf, most servers will
    /// reject it.
    ///
    /// # Returns
    ///
    /// * `Ok(GrpcWebResponse)` - The server answered, whatever the HTTP or gRPC status.
    /// * `Err(InvokeError)` - The request could not be built or the exchange failed.
    pub async fn invoke(
        &self,
        request: GrpcWebRequest,
        schema: &ProtoSchema,
    ) -> Result<GrpcWebResponse, InvokeError> {
        let url = self.url_for(&request);
        let payload = encode_payload(&request, schema)?;
        let headers = build_headers(request.text_framing, &request.headers)?;
        let request_headers = header_pairs(&headers);

        let framed = frame::frame(&payload);
        let body = if request.text_framing {
            Bytes::from(frame::encode_text(&framed))
        } else {
            framed
        };

        info!(url = %url, text = request.text_framing, "sending gRPC-Web request");
        debug!(payload_bytes = payload.len(), body_bytes = body.len(), "request body framed");

        let started = Instant::now();

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| InvokeError::Transport {
                url: url.clone(),
                source,
            })?;

        let http_status = response.status().as_u16();
        let response_headers = header_pairs(response.headers());

        let raw = response
            .bytes()
            .await
            .map_err(|source| InvokeError::Transport {
                url: url.clone(),
                source,
            })?;

        let elapsed = started.elapsed();

        // A body that is not base64 (typically a proxy error page) is kept out of the frame
        // reader and reported as an incomplete response.
        let (body, unreadable) = if request.text_framing {
            match frame::decode_text(&raw) {
                Ok(decoded) => (decoded, false),
                Err(err) => {
                    warn!(
                        url = %url,
                        http_status,
                        body_bytes = raw.len(),
                        error = %err,
                        "response body is not grpc-web-text"
                    );
                    (Bytes::new(), true)
                }
            }
        } else {
            (raw, false)
        };

        let first = frame::unframe(&body);
        let (payload, truncated) = if first.is_trailer() {
            (Bytes::new(), false)
        } else {
            (first.payload, unreadable || (!body.is_empty() && first.truncated))
        };

        if truncated {
            warn!(
                url = %url,
                declared = first.declared_len,
                received = payload.len(),
                "gRPC-Web response frame is truncated"
            );
        }

        let (grpc_status, grpc_message) = grpc_status(&response_headers, &body);

        info!(
            url = %url,
            http_status,
            grpc_status,
            elapsed_ms = elapsed.as_millis() as u64,
            "received gRPC-Web response"
        );

        Ok(GrpcWebResponse {
            http_status,
            grpc_status,
            grpc_message,
            payload,
            truncated,
            elapsed,
            headers: response_headers,
            request_headers,
        })
    }
}

fn encode_payload(request: &GrpcWebRequest, schema: &ProtoSchema) -> Result<Vec<u8>, InvokeError> {
    let json = match &request.payload {
        RequestPayload::Message(msg) => return Ok(msg.encode_to_vec()),
        RequestPayload::Json(json) => json,
    };

    if schema.is_degraded() {
        warn!(
            service = %request.service,
            method = %request.method,
            "no compiled schema, sending raw JSON as the frame payload"
        );
        return Ok(json.as_bytes().to_vec());
    }

    let service = schema
        .service(&request.service)
        .ok_or_else(|| InvokeError::ServiceNotFound(request.service.clone()))?;

    let method = service
        .method(&request.method)
        .ok_or_else(|| InvokeError::MethodNotFound {
            service: request.service.clone(),
            method: request.method.clone(),
        })?;

    match method.codec() {
        Some(codec) => Ok(codec.encode_request(json)?),
        None => {
            warn!(method = %request.method, "method has no request type, sending raw JSON");
            Ok(json.as_bytes().to_vec())
        }
    }
}

/// Default gRPC-Web headers followed by the caller's.
///
/// The first occurrence of a custom header replaces any default of the same name, further
/// occurrences are appended so every value is sent.
fn build_headers(text: bool, custom: &[(String, String)]) -> Result<HeaderMap, InvokeError> {
    let content_type = HeaderValue::from_static(if text {
        CONTENT_TYPE_TEXT
    } else {
        CONTENT_TYPE_PROTO
    });

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, content_type.clone());
    headers.insert(ACCEPT, content_type);
    headers.insert(X_GRPC_WEB, HeaderValue::from_static("1"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    let mut seen = HashSet::new();
    for (k, v) in custom {
        let key = HeaderName::from_str(k).map_err(|source| InvokeError::InvalidHeaderKey {
            key: k.clone(),
            source,
        })?;
        let val = HeaderValue::from_str(v).map_err(|source| InvokeError::InvalidHeaderValue {
            key: k.clone(),
            source,
        })?;

        if seen.insert(key.clone()) {
            headers.insert(key, val);
        } else {
            headers.append(key, val);
        }
    }

    Ok(headers)
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn grpc_status(headers: &[(String, String)], body: &Bytes) -> (i32, Option<String>) {
    let header = |name: &str| {
        headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    };

    let (status, message) = match header("grpc-status") {
        Some(status) => (Some(status), header("grpc-message")),
        None => match Trailers::from_body(body) {
            Some(trailers) => (trailers.status, trailers.message),
            None => (None, header("grpc-message")),
        },
    };

    let code = status
        .map(|s| s.trim().parse().unwrap_or(GRPC_STATUS_UNKNOWN))
        .unwrap_or(GRPC_STATUS_OK);

    let message = message
        .filter(|m| !m.is_empty())
        .map(|m| percent_decode_str(&m).decode_utf8_lossy().into_owned());

    (code, message)
}
