//! # Sampler
//!
//! One call, packaged the way a load-test harness records it.
//!
//! [`Sampler::sample`] never fails: whatever happens between reading the proto file and
//! decoding the reply ends up in the returned [`SampleResult`], with `successful` telling
//! the harness whether to count it as a pass.
use crate::cache::ParserCache;
use crate::config::{ClientConfig, ConfigError};
use crate::grpc_web::client::{GrpcWebClient, InvokeError};
use crate::grpc_web::{GrpcWebRequest, GrpcWebResponse};
use crate::resolver::DescriptorError;
use crate::schema::{MethodSchema, ProtoSchema};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// What to call and with which JSON body.
#[derive(Debug, Clone)]
pub struct SampleRequest {
    pub proto_path: PathBuf,
    pub service: String,
    pub method: String,
    pub body: String,
}

impl SampleRequest {
    pub fn label(&self) -> String {
        format!("{}/{}", self.service, self.method)
    }
}

/// The outcome of one sample.
#[derive(Debug, Clone, Default)]
pub struct SampleResult {
    /// `Service/Method`.
    pub label: String,
    pub successful: bool,
    /// The HTTP status code, `500` when the call never produced a response.
    pub response_code: String,
    pub response_message: String,
    /// Latency of the HTTP exchange, zero when it never happened.
    pub elapsed: Duration,
    pub response_headers: String,
    pub request_headers: String,
    /// The request body as sent by the caller.
    pub sampler_data: String,
    pub response_data: String,
}

impl SampleResult {
    fn fail(&mut self, err: SampleError) {
        self.successful = false;
        self.response_code = "500".to_string();
        self.response_message = format!("Internal Error: {err}");
        self.response_data = err.to_string();
    }
}

/// Runs samples against one gRPC-Web server.
///
/// Clones share the HTTP connection pool and the parser cache.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: ClientConfig,
    cache: Arc<ParserCache>,
    client: GrpcWebClient,
}

impl Sampler {
    pub fn new(config: ClientConfig, cache: Arc<ParserCache>) -> Result<Self, SampleError> {
        config.validate()?;
        let client = GrpcWebClient::from_config(&config)?;

        Ok(Self {
            config,
            cache,
            client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ParserCache> {
        &self.cache
    }

    pub async fn sample(&self, request: &SampleRequest) -> SampleResult {
        let mut result = SampleResult {
            label: request.label(),
            sampler_data: request.body.clone(),
            ..Default::default()
        };

        if let Err(err) = self.run(request, &mut result).await {
            warn!(sample = %result.label, error = %err, "sample failed");
            result.fail(err);
        }

        result
    }

    async fn run(
        &self,
        request: &SampleRequest,
        result: &mut SampleResult,
    ) -> Result<(), SampleError> {
        let schema = self.schema(&request.proto_path).await?;

        let call = GrpcWebRequest::json(
            &schema,
            request.service.clone(),
            request.method.clone(),
            request.body.clone(),
        )
        .with_text_framing(self.config.text_framing)
        .with_headers(self.config.headers.clone());

        let response = self.client.invoke(call, &schema).await?;

        result.successful = response.is_successful();
        result.response_code = response.http_status.to_string();
        result.response_message = response_message(&response);
        result.elapsed = response.elapsed;
        result.response_headers = format!(
            "HTTP/1.1 {}\n{}",
            response.http_status,
            render_headers(&response.headers)
        );
        result.request_headers = render_headers(&response.request_headers);

        if response.truncated {
            result.successful = false;
            result.response_message.push_str(" (incomplete response)");
        }

        render_payload(&schema, request, &response, result);

        Ok(())
    }

    /// The compiled schema from the cache, or a name-only one when compilation is broken.
    async fn schema(&self, path: &Path) -> Result<Arc<ProtoSchema>, DescriptorError> {
        match self.cache.get_or_resolve(path).await {
            Ok(schema) => Ok(schema),
            Err(err) if err.is_degradable() => {
                warn!(
                    proto = %path.display(),
                    error = %err,
                    "using a name-only schema, requests will carry raw JSON"
                );
                Ok(Arc::new(self.cache.resolver().scan(path).await?))
            }
            Err(err) => Err(err),
        }
    }
}

fn response_message(response: &GrpcWebResponse) -> String {
    if response.grpc_status == 0 {
        return "OK".to_string();
    }

    response
        .grpc_message
        .clone()
        .unwrap_or_else(|| format!("grpc-status {}", response.grpc_status))
}

fn render_headers(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}\n"))
        .collect()
}

fn render_payload(
    schema: &ProtoSchema,
    request: &SampleRequest,
    response: &GrpcWebResponse,
    result: &mut SampleResult,
) {
    let codec = schema
        .method(&request.service, &request.method)
        .and_then(MethodSchema::codec);

    let Some(codec) = codec else {
        result.response_data = String::from_utf8_lossy(&response.payload).into_owned();
        return;
    };

    if !response.is_successful() && response.payload.is_empty() {
        result.response_data = response.grpc_message.clone().unwrap_or_default();
        return;
    }

    match codec.decode_response(&response.payload) {
        Ok(value) => {
            debug!(sample = %result.label, "response decoded");
            result.response_data = value.to_string();
        }
        Err(err) => {
            warn!(sample = %result.label, error = %err, "response payload could not be decoded");
            result.successful = false;
            result.response_message = format!("{} ({err})", result.response_message);
            result.response_data = STANDARD.encode(&response.payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(grpc_status: i32, grpc_message: Option<&str>) -> GrpcWebResponse {
        GrpcWebResponse {
            http_status: 200,
            grpc_status,
            grpc_message: grpc_message.map(str::to_string),
            payload: Bytes::new(),
            truncated: false,
            elapsed: Duration::ZERO,
            headers: Vec::new(),
            request_headers: Vec::new(),
        }
    }

    #[test]
    fn message_for_status() {
        assert_eq!(response_message(&response(0, Some("ignored"))), "OK");
        assert_eq!(response_message(&response(5, Some("not found"))), "not found");
        assert_eq!(response_message(&response(14, None)), "grpc-status 14");
    }

    #[test]
    fn headers_render_one_per_line() {
        let headers = vec![
            ("content-type".to_string(), "application/grpc-web+proto".to_string()),
            ("grpc-status".to_string(), "0".to_string()),
        ];
        assert_eq!(
            render_headers(&headers),
            "content-type: application/grpc-web+proto\ngrpc-status: 0\n"
        );
    }

    #[test]
    fn failure_is_an_internal_error() {
        let mut result = SampleResult::default();
        result.fail(SampleError::Config(ConfigError::ZeroTimeout));

        assert!(!result.successful);
        assert_eq!(result.response_code, "500");
        assert_eq!(
            result.response_message,
            "Internal Error: Timeout must be greater than zero"
        );
        assert_eq!(result.response_data, "Timeout must be greater than zero");
    }
}
