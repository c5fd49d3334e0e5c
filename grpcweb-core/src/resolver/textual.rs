//! Lightweight scanning of raw `.proto` text.
//!
//! This is not a parser: it strips comments and pattern-matches `package`, `service` and
//! `rpc` declarations, which is enough to list names for discovery when the descriptor
//! compiler is unavailable.
use crate::schema::{MethodSchema, ServiceSchema};
use once_cell::sync::Lazy;
use regex::Regex;

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"//[^\n]*").expect("valid regex"));

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

static PACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpackage\s+([\w.]+)\s*;").expect("valid regex"));

// One level of nested braces is allowed so `rpc X(A) returns (B) { option ... }` bodies
// don't cut the service block short.
static SERVICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bservice\s+(\w+)\s*\{((?:[^{}]|\{[^{}]*\})*)\}").expect("valid regex")
});

static RPC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\brpc\s+(\w+)\s*\(\s*(?:stream\s+)?([\w.]+)\s*\)\s*returns\s*\(\s*(?:stream\s+)?([\w.]+)\s*\)",
    )
    .expect("valid regex")
});

/// Removes `//` line comments and non-nested `/* */` block comments.
pub(crate) fn strip_comments(source: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(source, "");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Returns the first `package a.b.c;` declaration, or an empty string.
pub(crate) fn package_name(cleaned: &str) -> String {
    PACKAGE
        .captures(cleaned)
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

/// Scans every `service { rpc ... }` block. Services without any rpc are skipped.
pub(crate) fn services(cleaned: &str, package: &str) -> Vec<ServiceSchema> {
    SERVICE
        .captures_iter(cleaned)
        .filter_map(|service| {
            let methods: Vec<MethodSchema> = RPC
                .captures_iter(&service[2])
                .map(|rpc| {
                    MethodSchema::named(rpc[1].to_string(), rpc[2].to_string(), rpc[3].to_string())
                })
                .collect();

            (!methods.is_empty())
                .then(|| ServiceSchema::new(service[1].to_string(), package, methods))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROTO: &str = r#"
syntax = "proto3";
// package commented.out;
package shop.v1;

/* service Ghost { rpc Boo(A) returns (B); } */
service Catalog {
  // Lists products
  rpc ListProducts (ListRequest) returns (ListResponse);
  rpc Watch (stream WatchRequest) returns (stream google.protobuf.Empty) {
    option deprecated = true;
  }
}

service Empty {}

message ListRequest { string filter = 1; }
"#;

    #[test]
    fn strips_line_and_block_comments() {
        let cleaned = strip_comments("a // one\nb /* two\nthree */ c");
        assert_eq!(cleaned, "a \nb  c");
    }

    #[test]
    fn extracts_first_uncommented_package() {
        let cleaned = strip_comments(PROTO);
        assert_eq!(package_name(&cleaned), "shop.v1");
    }

    #[test]
    fn missing_package_is_empty() {
        assert_eq!(package_name("syntax = \"proto3\";"), "");
    }

    #[test]
    fn scans_services_and_rpcs() {
        let cleaned = strip_comments(PROTO);
        let services = services(&cleaned, "shop.v1");

        assert_eq!(services.len(), 1);
        let catalog = &services[0];
        assert_eq!(catalog.name(), "Catalog");
        assert_eq!(catalog.full_name(), "shop.v1.Catalog");

        let names: Vec<_> = catalog.methods().iter().map(|m| m.name()).collect();
        assert_eq!(names, ["ListProducts", "Watch"]);

        let watch = catalog.method("Watch").unwrap();
        assert_eq!(watch.request_type_name(), "WatchRequest");
        assert_eq!(watch.response_type_name(), "google.protobuf.Empty");
        assert!(watch.request_type().is_none());
    }
}
