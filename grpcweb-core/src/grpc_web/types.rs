use crate::codec::{self, DecodeError};
use crate::schema::ProtoSchema;
use bytes::Bytes;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use std::time::Duration;

/// What gets encoded into the request frame.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    /// A JSON document, encoded with the method's request type at send time.
    Json(String),
    /// A message built by the caller.
    Message(DynamicMessage),
}

/// A request object encapsulating all necessary information to perform a gRPC-Web call.
///
/// Built fresh for every call and consumed by [`super::client::GrpcWebClient::invoke`].
#[derive(Debug, Clone)]
pub struct GrpcWebRequest {
    /// The proto package, empty when the service is addressed unqualified.
    pub package: String,
    /// The service name (e.g. `Greeter`).
    pub service: String,
    /// The name of the method to call (e.g. `SayHello`).
    pub method: String,
    pub payload: RequestPayload,
    /// Use the base64 `application/grpc-web-text` wire variant.
    pub text_framing: bool,
    /// Extra headers, sent in order. Repeated names are all sent.
    pub headers: Vec<(String, String)>,
}

impl GrpcWebRequest {
    /// A binary-framed JSON request addressed within the package of `schema`.
    pub fn json(
        schema: &ProtoSchema,
        service: impl Into<String>,
        method: impl Into<String>,
        json: impl Into<String>,
    ) -> Self {
        Self {
            package: schema.package().to_string(),
            service: service.into(),
            method: method.into(),
            payload: RequestPayload::Json(json.into()),
            text_framing: false,
            headers: Vec::new(),
        }
    }

    pub fn with_text_framing(mut self, text_framing: bool) -> Self {
        self.text_framing = text_framing;
        self
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// The HTTP path of the call, `/package.Service/Method` or `/Service/Method`.
    ///
    /// A service name that is already package-qualified is used as is.
    pub fn path(&self) -> String {
        let prefix = format!("{}.", self.package);
        if self.package.is_empty() || self.service.starts_with(&prefix) {
            format!("/{}/{}", self.service, self.method)
        } else {
            format!("/{}.{}/{}", self.package, self.service, self.method)
        }
    }

    /// Value of a custom header. When the name is repeated the last value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        last_value(&self.headers, name)
    }
}

/// The outcome of a gRPC-Web call that reached the server.
#[derive(Debug, Clone)]
pub struct GrpcWebResponse {
    pub http_status: u16,
    /// `0` (OK) when the server sent no status at all.
    pub grpc_status: i32,
    pub grpc_message: Option<String>,
    /// The payload of the first data frame.
    pub payload: Bytes,
    /// The body ended before the data frame did; `payload` holds what was received.
    pub truncated: bool,
    /// Time spent on the HTTP exchange only.
    pub elapsed: Duration,
    pub headers: Vec<(String, String)>,
    /// Headers as they were sent, defaults included.
    pub request_headers: Vec<(String, String)>,
}

impl GrpcWebResponse {
    pub fn is_successful(&self) -> bool {
        self.http_status == 200 && self.grpc_status == 0
    }

    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }

    /// Value of a response header (case-insensitive). When repeated the last value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        last_value(&self.headers, name)
    }

    /// Renders the payload as JSON using the method's response type.
    pub fn decode_json(&self, desc: &MessageDescriptor) -> Result<serde_json::Value, DecodeError> {
        codec::decode(desc, &self.payload)
    }
}

fn last_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(package: &str, service: &str) -> GrpcWebRequest {
        GrpcWebRequest {
            package: package.to_string(),
            service: service.to_string(),
            method: "Do".to_string(),
            payload: RequestPayload::Json("{}".to_string()),
            text_framing: false,
            headers: vec![
                ("x-trace".to_string(), "a".to_string()),
                ("X-Trace".to_string(), "b".to_string()),
            ],
        }
    }

    #[test]
    fn path_includes_package() {
        assert_eq!(request("pkg.sub", "Svc").path(), "/pkg.sub.Svc/Do");
    }

    #[test]
    fn path_without_package() {
        assert_eq!(request("", "Svc").path(), "/Svc/Do");
    }

    #[test]
    fn qualified_service_is_not_prefixed_twice() {
        assert_eq!(request("pkg.sub", "pkg.sub.Svc").path(), "/pkg.sub.Svc/Do");
    }

    #[test]
    fn last_header_wins() {
        assert_eq!(request("", "Svc").header("X-TRACE"), Some("b"));
        assert_eq!(request("", "Svc").header("missing"), None);
    }

    #[test]
    fn success_needs_http_ok_and_grpc_ok() {
        let mut response = GrpcWebResponse {
            http_status: 200,
            grpc_status: 0,
            grpc_message: None,
            payload: Bytes::new(),
            truncated: false,
            elapsed: Duration::from_millis(12),
            headers: Vec::new(),
            request_headers: Vec::new(),
        };
        assert!(response.is_successful());
        assert_eq!(response.elapsed_millis(), 12);

        response.grpc_status = 5;
        assert!(!response.is_successful());

        response.grpc_status = 0;
        response.http_status = 503;
        assert!(!response.is_successful());
    }
}
