//! Transport adapter between HTTP exchanges and protocol messages.
//!
//! # Responsibilities
//! - Canonicalize transport header names (`HTTP_AUTH_ID` → `AUTH-ID`)
//! - Map HTTP methods onto protocol verbs
//! - Decode request bodies by content type
//! - Encode responses with exact `Content-Length`
//!
//! # Design Decisions
//! - Works on plain strings and bytes; `server.rs` owns the axum types
//! - No content type means no body, whatever the buffer holds

use crate::protocol::{HeaderMap, ProtocolError, Request, Response, PROTOCOL_HEADERS};

pub const CONTENT_TYPE_JSON: &str = "application/json;charset=utf-8";

/// One inbound exchange, as a transport hands it over.
#[derive(Debug, Clone, Default)]
pub struct Environ {
    pub method: String,
    /// Request path without query string.
    pub path: String,
    /// Header or environment variables by raw name.
    pub vars: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Canonical protocol name of a transport header.
#[must_use]
pub fn canonical_header_name(name: &str) -> String {
    let upper = name.to_ascii_uppercase();
    let stripped = upper.strip_prefix("HTTP_").unwrap_or(&upper);
    stripped.replace('_', "-")
}

/// Canonicalize transport headers, keeping only protocol headers.
pub fn canonicalize<I, K, V>(vars: I) -> HeaderMap
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    vars.into_iter()
        .map(|(name, value)| (canonical_header_name(name.as_ref()), value.into()))
        .filter(|(name, _)| PROTOCOL_HEADERS.contains(&name.as_str()))
        .collect()
}

/// Protocol verb token for an HTTP method. Unknown methods pass through
/// for the dispatcher to reject.
#[must_use]
pub fn verb_for(method: &str, path: &str, header_map: &HeaderMap) -> String {
    let method = method.to_ascii_uppercase();
    match method.as_str() {
        "POST" if path.contains('(') => "CALL".to_string(),
        "POST" => "CREATE".to_string(),
        "PUT" | "PATCH" => "UPDATE".to_string(),
        "GET" if header_map.contains_key("FILTER") => "LIST".to_string(),
        _ => method,
    }
}

/// Build a protocol request from an exchange.
pub fn build_request(environ: Environ) -> Result<Request, ProtocolError> {
    let header_map = canonicalize(environ.vars);
    let verb = verb_for(&environ.method, &environ.path, &header_map);
    let content_type = header_map.get("CONTENT-TYPE").cloned();
    let mut request = Request::new(verb, environ.path, header_map);

    let method = environ.method.to_ascii_uppercase();
    if matches!(method.as_str(), "HEAD" | "OPTIONS") {
        return Ok(request);
    }

    if let Some(content_type) = content_type {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media_type.as_str() {
            "application/json" => request.decode_json(&environ.body)?,
            "text/plain" => request.decode_text(&environ.body)?,
            _ => {
                return Err(ProtocolError::bad_request(format!(
                    "Unknown Content-Type \"{content_type}\""
                )))
            }
        }
    }

    Ok(request)
}

/// A response ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Serialize a response body and compute its headers.
pub fn encode(response: &Response) -> Result<Encoded, serde_json::Error> {
    let body = response.body_bytes()?;

    let mut headers = vec![
        ("Content-Type".to_string(), CONTENT_TYPE_JSON.to_string()),
        ("Content-Length".to_string(), body.len().to_string()),
    ];
    headers.extend(
        response
            .header_map
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    Ok(Encoded {
        status: response.status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn environ(method: &str, path: &str, vars: &[(&str, &str)], body: &str) -> Environ {
        Environ {
            method: method.into(),
            path: path.into(),
            vars: vars
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[rstest]
    #[case("HTTP_AUTH_ID", "AUTH-ID")]
    #[case("HTTP_CINP_VERSION", "CINP-VERSION")]
    #[case("CONTENT_TYPE", "CONTENT-TYPE")]
    #[case("multi-object", "MULTI-OBJECT")]
    fn canonical_names(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(canonical_header_name(raw), expected);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize([
            ("HTTP_AUTH_ID", "root"),
            ("HTTP_X_FORWARDED_FOR", "10.0.0.1"),
            ("HTTP_COUNT", "5"),
        ]);
        let twice = canonicalize(once.clone());

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[rstest]
    #[case("POST", "/api/ns/model(act)", false, "CALL")]
    #[case("POST", "/api/ns/model", false, "CREATE")]
    #[case("PUT", "/api/ns/model:1:", false, "UPDATE")]
    #[case("PATCH", "/api/ns/model:1:", false, "UPDATE")]
    #[case("GET", "/api/ns/model", true, "LIST")]
    #[case("GET", "/api/ns/model", false, "GET")]
    #[case("DESCRIBE", "/api/", false, "DESCRIBE")]
    fn verbs(#[case] method: &str, #[case] path: &str, #[case] filter: bool, #[case] expected: &str) {
        let mut header_map = HeaderMap::new();
        if filter {
            header_map.insert("FILTER".into(), "by_name".into());
        }
        assert_eq!(verb_for(method, path, &header_map), expected);
    }

    #[test]
    fn delete_with_full_header_set() {
        let request = build_request(environ(
            "DELETE",
            "/api/ns/model:key:",
            &[
                ("HTTP_AUTH_ID", "root"),
                ("HTTP_AUTH_TOKEN", "kd8dkk9ddd"),
                ("HTTP_FILTER", "curent"),
                ("HTTP_CINP_VERSION", "0.9"),
                ("HTTP_POSITION", "50"),
                ("HTTP_COUNT", "34"),
                ("HTTP_MULTI_OBJECT", "True"),
                ("CONTENT_TYPE", "application/json"),
                ("HTTP_USER_AGENT", "test"),
            ],
            r#"{"this": "works"}"#,
        ))
        .unwrap();

        assert_eq!(request.verb, "DELETE");
        assert_eq!(request.header_map.len(), 8);
        assert_eq!(request.header("FILTER"), Some("curent"));
        assert_eq!(request.header("MULTI-OBJECT"), Some("True"));
        assert_eq!(request.header("AUTH-ID"), Some("root"));
        assert_eq!(request.data, Some(json!({"this": "works"})));
    }

    #[test]
    fn get_without_content_type_has_no_data() {
        let request = build_request(environ(
            "GET",
            "/api/ns/model:1:",
            &[("HTTP_CINP_VERSION", "0.9")],
            r#"{"ignored": true}"#,
        ))
        .unwrap();
        assert!(request.data.is_none());
    }

    #[test]
    fn options_body_is_not_decoded() {
        let request = build_request(environ(
            "OPTIONS",
            "/api/",
            &[("CONTENT_TYPE", "application/json")],
            "not json",
        ))
        .unwrap();
        assert!(request.data.is_none());
    }

    #[test]
    fn malformed_json_and_unknown_type_are_rejected() {
        let bad_json = build_request(environ(
            "POST",
            "/api/ns/model",
            &[("CONTENT_TYPE", "application/json")],
            "{",
        ))
        .unwrap_err();
        assert_eq!(bad_json.status(), 400);

        let unknown = build_request(environ(
            "POST",
            "/api/ns/model",
            &[("CONTENT_TYPE", "application/xml")],
            "<a/>",
        ))
        .unwrap_err();
        assert_eq!(unknown.to_string(), "Unknown Content-Type \"application/xml\"");
    }

    #[test]
    fn encode_sets_length_and_merges_headers() {
        let response = Response::new(201)
            .with_data(json!({"b": 1, "a": 2}))
            .with_header("Object-Id", "/api/ns/model:1:");
        let encoded = encode(&response).unwrap();

        assert_eq!(encoded.status, 201);
        assert_eq!(encoded.body, br#"{"b":1,"a":2}"#.to_vec());
        assert!(encoded
            .headers
            .contains(&("Content-Length".to_string(), encoded.body.len().to_string())));
        assert!(encoded
            .headers
            .contains(&("Object-Id".to_string(), "/api/ns/model:1:".to_string())));
    }
}
