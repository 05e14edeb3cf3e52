//! Inbound protocol requests.
//!
//! # Responsibilities
//! - Hold the raw verb token, URI, protocol headers and decoded body
//! - Restrict headers to the protocol set
//! - Decode JSON and plain-text bodies

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::protocol::error::ProtocolError;

/// Header map keyed by canonical (upper-case, `-` separated) names.
pub type HeaderMap = BTreeMap<String, String>;

/// Headers the protocol understands; everything else is dropped.
pub const PROTOCOL_HEADERS: [&str; 9] = [
    "CINP-VERSION",
    "AUTH-ID",
    "AUTH-TOKEN",
    "CONTENT-TYPE",
    "FILTER",
    "POSITION",
    "COUNT",
    "MULTI-OBJECT",
    "ID-ONLY",
];

/// A protocol request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Verb token as received; validated by the dispatcher.
    pub verb: String,
    pub uri: String,
    pub header_map: HeaderMap,
    pub data: Option<Value>,
}

impl Request {
    /// Create a request, keeping only protocol headers.
    pub fn new(verb: impl Into<String>, uri: impl Into<String>, header_map: HeaderMap) -> Self {
        let header_map = header_map
            .into_iter()
            .filter(|(name, _)| PROTOCOL_HEADERS.contains(&name.as_str()))
            .collect();

        Self {
            verb: verb.into(),
            uri: uri.into(),
            header_map,
            data: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_uppercase();
        if PROTOCOL_HEADERS.contains(&name.as_str()) {
            self.header_map.insert(name, value.into());
        }
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Look up a header by canonical name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_map.get(name).map(String::as_str)
    }

    /// Decode a JSON body. Blank bodies leave `data` empty.
    pub fn decode_json(&mut self, body: &[u8]) -> Result<(), ProtocolError> {
        let text = std::str::from_utf8(body)
            .map_err(|_| ProtocolError::bad_request("Body is not valid UTF-8"))?;
        if text.trim().is_empty() {
            self.data = None;
            return Ok(());
        }

        let value = serde_json::from_str(text).map_err(|err| {
            ProtocolError::bad_request(format!("Unable to parse JSON body: {err}"))
        })?;
        self.data = Some(value);
        Ok(())
    }

    /// Decode a plain-text body into a string value.
    pub fn decode_text(&mut self, body: &[u8]) -> Result<(), ProtocolError> {
        let text = std::str::from_utf8(body)
            .map_err(|_| ProtocolError::bad_request("Body is not valid UTF-8"))?;
        self.data = if text.is_empty() {
            None
        } else {
            Some(Value::String(text.to_string()))
        };
        Ok(())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Request {} \"{}\">", self.verb, self.uri)
    }
}
