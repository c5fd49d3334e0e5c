//! # Proto Schema
//!
//! Queryable metadata recovered from a single `.proto` file: its package, the services it
//! declares and, for every method, the request and response message types.
//!
//! A [`ProtoSchema`] comes in two flavours:
//!
//! * **Compiled**: backed by a real `prost_reflect::DescriptorPool`. Every method carries
//!   a [`MessageDescriptor`] for both its request and its response, which is what the
//!   [`crate::codec`] needs to build messages at runtime.
//! * **Degraded**: built from a textual scan of the proto source when the descriptor
//!   compiler is unavailable. It only knows *names* and must never be used to encode or
//!   decode binary messages.
//!
//! Schemas are immutable once built and are shared read-only through the
//! [`crate::cache::ParserCache`].
use crate::codec::JsonCodec;
use prost_reflect::{DescriptorPool, MessageDescriptor, ServiceDescriptor};
use std::path::{Path, PathBuf};

/// Schema metadata for one proto file.
#[derive(Debug, Clone)]
pub struct ProtoSchema {
    source: PathBuf,
    package: String,
    services: Vec<ServiceSchema>,
    pool: Option<DescriptorPool>,
}

/// A service declared in the proto file, with its methods in declaration order.
#[derive(Debug, Clone)]
pub struct ServiceSchema {
    name: String,
    full_name: String,
    methods: Vec<MethodSchema>,
}

/// A single rpc of a service.
#[derive(Debug, Clone)]
pub struct MethodSchema {
    name: String,
    request_type_name: String,
    response_type_name: String,
    request_type: Option<MessageDescriptor>,
    response_type: Option<MessageDescriptor>,
}

impl ProtoSchema {
    /// Builds a compiled schema from the services of a resolved file descriptor.
    pub(crate) fn compiled(
        source: PathBuf,
        package: String,
        services: impl Iterator<Item = ServiceDescriptor>,
        pool: DescriptorPool,
    ) -> Self {
        let services = services.map(ServiceSchema::from_descriptor).collect();

        Self {
            source,
            package,
            services,
            pool: Some(pool),
        }
    }

    /// Builds a name-only schema. See the module documentation for its restrictions.
    pub(crate) fn degraded(source: PathBuf, package: String, services: Vec<ServiceSchema>) -> Self {
        Self {
            source,
            package,
            services,
            pool: None,
        }
    }

    /// Path of the proto file this schema was derived from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The proto package, empty when the file declares none.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// `true` when the schema only holds names recovered from the proto text.
    pub fn is_degraded(&self) -> bool {
        self.pool.is_none()
    }

    /// The descriptor pool backing a compiled schema.
    pub fn descriptor_pool(&self) -> Option<&DescriptorPool> {
        self.pool.as_ref()
    }

    pub fn services(&self) -> &[ServiceSchema] {
        &self.services
    }

    /// Lists the service names in declaration order.
    pub fn list_services(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// Lists the method names of `service` in declaration order.
    ///
    /// Returns an empty list when the service is unknown.
    pub fn list_methods(&self, service: &str) -> Vec<String> {
        self.service(service)
            .map(|s| s.methods.iter().map(|m| m.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Looks a service up by its short name (`Greeter`) or its full name (`helloworld.Greeter`).
    pub fn service(&self, name: &str) -> Option<&ServiceSchema> {
        self.services
            .iter()
            .find(|s| s.name == name || s.full_name == name)
    }

    /// Looks a method up by service and method name.
    pub fn method(&self, service: &str, method: &str) -> Option<&MethodSchema> {
        self.service(service)?.method(method)
    }
}

impl ServiceSchema {
    pub(crate) fn new(name: String, package: &str, methods: Vec<MethodSchema>) -> Self {
        let full_name = qualify(package, &name);
        Self {
            name,
            full_name,
            methods,
        }
    }

    fn from_descriptor(service: ServiceDescriptor) -> Self {
        let methods = service
            .methods()
            .map(|m| MethodSchema {
                name: m.name().to_string(),
                request_type_name: m.input().full_name().to_string(),
                response_type_name: m.output().full_name().to_string(),
                request_type: Some(m.input()),
                response_type: Some(m.output()),
            })
            .collect();

        Self {
            name: service.name().to_string(),
            full_name: service.full_name().to_string(),
            methods,
        }
    }

    /// Short service name, e.g. `Greeter`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package-qualified service name, e.g. `helloworld.Greeter`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn methods(&self) -> &[MethodSchema] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodSchema> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl MethodSchema {
    pub(crate) fn named(name: String, request_type_name: String, response_type_name: String) -> Self {
        Self {
            name,
            request_type_name,
            response_type_name,
            request_type: None,
            response_type: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn request_type_name(&self) -> &str {
        &self.request_type_name
    }

    pub fn response_type_name(&self) -> &str {
        &self.response_type_name
    }

    /// Descriptor of the request message. Always `Some` on compiled schemas.
    pub fn request_type(&self) -> Option<&MessageDescriptor> {
        self.request_type.as_ref()
    }

    /// Descriptor of the response message. Always `Some` on compiled schemas.
    pub fn response_type(&self) -> Option<&MessageDescriptor> {
        self.response_type.as_ref()
    }

    /// The JSON codec of this method, `None` on degraded schemas.
    pub fn codec(&self) -> Option<JsonCodec> {
        Some(JsonCodec::new(
            self.request_type.clone()?,
            self.response_type.clone()?,
        ))
    }
}

fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeter_service::FILE_DESCRIPTOR_SET;
    use serde_json::json;

    #[test]
    fn compiled_methods_carry_a_codec() {
        let schema = ProtoSchema::from_descriptor_set(FILE_DESCRIPTOR_SET, "greeter.proto").unwrap();
        let codec = schema.method("Greeter", "SayHello").unwrap().codec().unwrap();

        let bytes = codec.encode_request(r#"{"name":"Ada"}"#).unwrap();
        assert_eq!(bytes, [0x0a, 0x03, b'A', b'd', b'a']);

        let value = codec.decode_response(&[0x0a, 0x02, b'H', b'i']).unwrap();
        assert_eq!(value, json!({ "message": "Hi" }));
    }

    #[test]
    fn degraded_methods_have_no_codec() {
        let method = MethodSchema::named(
            "SayHello".to_string(),
            "HelloRequest".to_string(),
            "HelloReply".to_string(),
        );
        let service = ServiceSchema::new("Greeter".to_string(), "helloworld", vec![method]);
        let schema = ProtoSchema::degraded(PathBuf::from("greeter.proto"), "helloworld".to_string(), vec![service]);

        assert_eq!(schema.service("helloworld.Greeter").unwrap().name(), "Greeter");
        assert!(schema.method("Greeter", "SayHello").unwrap().codec().is_none());
    }
}
