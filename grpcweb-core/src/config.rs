//! # Client Configuration
//!
//! What a host (a test harness, a GUI, the CLI) hands to the core before making calls: the
//! base URL, the call timeout, the wire variant and a block of custom headers.
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid base URL '{url}': '{source}'")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),
    #[error("Timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Applies to connecting and to each whole call.
    pub timeout: Duration,
    /// Use `application/grpc-web-text` instead of `application/grpc-web+proto`.
    pub text_framing: bool,
    /// Custom headers, in the order they are sent.
    pub headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            text_framing: false,
            headers: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    pub fn with_text_framing(mut self, text_framing: bool) -> Self {
        self.text_framing = text_framing;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends the headers of a raw `Name: Value` block, see [`parse_header_block`].
    pub fn with_header_block(mut self, block: &str) -> Self {
        self.headers.extend(parse_header_block(block));
        self
    }

    /// Checks the base URL is an absolute http(s) URL and the timeout is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        Ok(())
    }
}

/// Parses a block of `Name: Value` lines into ordered header pairs.
///
/// Blank lines, lines without a colon and lines with an empty name are skipped. Only the
/// first colon separates name from value, so values may contain colons.
pub fn parse_header_block(block: &str) -> Vec<(String, String)> {
    block
        .lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://localhost:8080");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.text_framing);
        assert!(config.headers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn header_block_skips_malformed_lines() {
        let block = "Authorization: Bearer abc\r\n\r\nno colon here\n: empty-name\nx-url: http://a:1\n  X-Spaced  :  v  \n";

        assert_eq!(
            parse_header_block(block),
            [
                ("Authorization".to_string(), "Bearer abc".to_string()),
                ("x-url".to_string(), "http://a:1".to_string()),
                ("X-Spaced".to_string(), "v".to_string()),
            ]
        );
    }

    #[test]
    fn header_block_keeps_duplicates_in_order() {
        let config = ClientConfig::new("http://h")
            .with_header("x-a", "0")
            .with_header_block("x-a: 1\nx-a: 2");

        let values: Vec<_> = config.headers.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["0", "1", "2"]);
    }

    #[test]
    fn rejects_bad_urls_and_zero_timeout() {
        assert!(matches!(
            ClientConfig::new("not a url").validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::new("ftp://h").validate(),
            Err(ConfigError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            ClientConfig::new("http://h").with_timeout_secs(0).validate(),
            Err(ConfigError::ZeroTimeout)
        ));
    }
}
