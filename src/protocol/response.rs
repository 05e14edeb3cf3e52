//! Outbound protocol responses.

use serde_json::Value;

use crate::protocol::request::HeaderMap;

/// A protocol response produced by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub data: Option<Value>,
    pub header_map: HeaderMap,
}

impl Response {
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            data: None,
            header_map: HeaderMap::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.header_map.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_map.get(name).map(String::as_str)
    }

    /// Serialize the body. A response without data has an empty body.
    pub fn body_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match &self.data {
            Some(data) => serde_json::to_vec(data),
            None => Ok(Vec::new()),
        }
    }
}
