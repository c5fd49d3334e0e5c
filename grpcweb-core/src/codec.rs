//! # JSON <-> Protobuf Codec
//!
//! Builds Protobuf messages at runtime from JSON documents, and renders Protobuf bytes back
//! into JSON, using nothing but a `prost_reflect::MessageDescriptor`.
//!
//! ## How it works
//!
//! 1. **Encode (JSON -> Proto)**:
//!    - Parses the text into a `serde_json::Value`.
//!    - Merges it into an empty `DynamicMessage` of the descriptor. Both `camelCase` and the
//!      original proto field names are accepted; unknown keys are ignored.
//!    - Serializes the message into its canonical binary form.
//!
//! 2. **Decode (Proto -> JSON)**:
//!    - Decodes the bytes into a `DynamicMessage` of the descriptor.
//!    - Renders it as JSON **including fields at their default value**, so callers always
//!      see the full shape of the type.
use prost::Message;
use prost_reflect::{DeserializeOptions, DynamicMessage, MessageDescriptor, SerializeOptions};

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Malformed JSON: '{0}'")]
    MalformedJson(#[source] serde_json::Error),
    #[error("JSON structure does not match Protobuf schema: '{0}'")]
    TypeMismatch(#[source] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to decode Protobuf bytes: '{0}'")]
    Truncated(#[from] prost::DecodeError),
    #[error("Failed to map response to JSON: '{0}'")]
    Render(#[from] serde_json::Error),
}

/// Encodes `json` as a binary message of type `desc`.
pub fn encode(desc: &MessageDescriptor, json: &str) -> Result<Vec<u8>, EncodeError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(EncodeError::MalformedJson)?;
    encode_value(desc, value)
}

/// Encodes an already parsed JSON value as a binary message of type `desc`.
pub fn encode_value(
    desc: &MessageDescriptor,
    value: serde_json::Value,
) -> Result<Vec<u8>, EncodeError> {
    Ok(to_message(desc, value)?.encode_to_vec())
}

/// Merges a JSON value into a fresh `DynamicMessage` of type `desc`.
pub fn to_message(
    desc: &MessageDescriptor,
    value: serde_json::Value,
) -> Result<DynamicMessage, EncodeError> {
    let options = DeserializeOptions::new().deny_unknown_fields(false);

    // serde_json::Value is itself a Deserializer, so it can be handed over directly.
    DynamicMessage::deserialize_with_options(desc.clone(), value, &options)
        .map_err(EncodeError::TypeMismatch)
}

/// Decodes `bytes` as a message of type `desc` and renders it as JSON.
pub fn decode(desc: &MessageDescriptor, bytes: &[u8]) -> Result<serde_json::Value, DecodeError> {
    let msg = DynamicMessage::decode(desc.clone(), bytes)?;
    to_json(&msg)
}

/// Renders a message as JSON, default-valued fields included.
pub fn to_json(msg: &DynamicMessage) -> Result<serde_json::Value, DecodeError> {
    let options = SerializeOptions::new().skip_default_fields(false);
    Ok(msg.serialize_with_options(serde_json::value::Serializer, &options)?)
}

/// Holds the request and response descriptors of one method.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    /// Schema for the input message.
    req_desc: MessageDescriptor,
    /// Schema for the output message.
    res_desc: MessageDescriptor,
}

impl JsonCodec {
    pub fn new(req_desc: MessageDescriptor, res_desc: MessageDescriptor) -> Self {
        Self { req_desc, res_desc }
    }

    pub fn encode_request(&self, json: &str) -> Result<Vec<u8>, EncodeError> {
        encode(&self.req_desc, json)
    }

    pub fn decode_response(&self, bytes: &[u8]) -> Result<serde_json::Value, DecodeError> {
        decode(&self.res_desc, bytes)
    }
}
