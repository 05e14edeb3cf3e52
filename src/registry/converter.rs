//! Conversion between wire values and validated native values.
//!
//! # Responsibilities
//! - Build object URIs and resolve them back to model/id references
//! - Coerce and validate inbound values per [`ParamKind`]
//! - Render outbound values per [`ParamKind`]
//!
//! # Design Decisions
//! - Native values stay `serde_json::Value`; conversion normalizes them
//!   (integers from strings, RFC 3339 timestamps, canonical model URIs)
//! - `null` and `""` mean "no value" for scalar kinds
//! - Model references are checked against the store but kept as URIs

use serde_json::{Map, Number, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::protocol::{Uri, UriError, UriParts};
use crate::registry::parameter::{ParamKind, Parameter};
use crate::transaction::{TransactionError, TransactionGuard};

/// Conversion failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// The value is not acceptable for the parameter.
    #[error("{0}")]
    Invalid(String),

    /// Looking up a referenced object failed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

fn invalid(message: impl Into<String>) -> ConversionError {
    ConversionError::Invalid(message.into())
}

/// Converts values and URIs for one server.
#[derive(Debug, Clone)]
pub struct Converter {
    uri: Uri,
}

impl Converter {
    pub fn new(uri: Uri) -> Self {
        Self { uri }
    }

    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// URI of one object of the model at `model_path`.
    #[must_use]
    pub fn object_uri(&self, model_path: &str, object_id: &str) -> String {
        format!("{model_path}:{object_id}:")
    }

    /// Split an object or element URI.
    pub fn resolve(&self, uri: &str) -> Result<UriParts, UriError> {
        self.uri.split(uri, false)
    }

    /// Convert an inbound value for `param`.
    pub fn to_native(
        &self,
        param: &Parameter,
        value: &Value,
        transaction: &mut TransactionGuard,
    ) -> Result<Value, ConversionError> {
        let Some(kind) = param.kind else {
            return Ok(Value::Null);
        };

        if !param.is_array {
            return self.scalar_to_native(param, kind, value, transaction);
        }

        match value {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::String(s) if s.is_empty() => Ok(Value::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| self.scalar_to_native(param, kind, item, transaction))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(invalid(format!(
                "Must be an Array/List, got \"{}\"",
                type_name(other)
            ))),
        }
    }

    /// Convert an outbound value for `param`.
    pub fn from_native(&self, param: &Parameter, value: &Value) -> Result<Value, ConversionError> {
        let Some(kind) = param.kind else {
            return Ok(Value::Null);
        };

        if !param.is_array {
            return scalar_from_native(param, kind, value);
        }

        match value {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(items) => items
                .iter()
                .map(|item| scalar_from_native(param, kind, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(invalid(format!(
                "Must be an Array/List, got \"{}\"",
                type_name(other)
            ))),
        }
    }

    fn scalar_to_native(
        &self,
        param: &Parameter,
        kind: ParamKind,
        value: &Value,
        transaction: &mut TransactionGuard,
    ) -> Result<Value, ConversionError> {
        let blank = is_blank(value);
        let converted = match kind {
            ParamKind::String => {
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(invalid("Unable to convert to a string")),
                };
                check_length(param, &text, "Value to long")?;
                Value::String(text)
            }
            ParamKind::Integer if blank => return Ok(Value::Null),
            ParamKind::Integer => to_integer(value)
                .map(Value::from)
                .ok_or_else(|| invalid("Unable to convert to an int"))?,
            ParamKind::Float if blank => return Ok(Value::Null),
            ParamKind::Float => to_float(value)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("Unable to convert to a float"))?,
            ParamKind::Boolean if blank => return Ok(Value::Null),
            ParamKind::Boolean => Value::Bool(to_bool(value)?),
            ParamKind::DateTime if blank => return Ok(Value::Null),
            ParamKind::DateTime => Value::String(normalize_timestamp(value)?),
            ParamKind::Map if blank => return Ok(Value::Object(Map::new())),
            ParamKind::Map => match value {
                Value::Object(_) => value.clone(),
                _ => return Err(invalid("Map must be an object")),
            },
            ParamKind::Model if blank => return Ok(Value::Null),
            ParamKind::Model => Value::String(self.resolve_reference(param, value, transaction)?),
            ParamKind::File if blank => return Ok(Value::Null),
            ParamKind::File => Value::String(check_scheme(param, value)?),
            ParamKind::User => return Ok(Value::Null),
        };

        if !param.choices.is_empty() && !param.choices.contains(&converted) {
            return Err(invalid(format!("\"{converted}\" is not a valid choice")));
        }

        Ok(converted)
    }

    /// Check that `value` is the URI of an existing object of the
    /// parameter's model and return its canonical form.
    fn resolve_reference(
        &self,
        param: &Parameter,
        value: &Value,
        transaction: &mut TransactionGuard,
    ) -> Result<String, ConversionError> {
        let target = param.model.as_deref().unwrap_or_default();
        let uri = value
            .as_str()
            .ok_or_else(|| invalid("Model reference must be a URI string"))?;
        let parts = self
            .resolve(uri)
            .map_err(|_| invalid(format!("Unable to parse \"{uri}\"")))?;

        if self.uri.element_path(&parts) != target || parts.action.is_some() {
            return Err(invalid(format!(
                "Object \"{uri}\" is for a model other than \"{target}\""
            )));
        }

        let object_id = match parts.ids() {
            [object_id] => object_id,
            _ => {
                return Err(invalid(format!(
                    "Object \"{uri}\" must reference exactly one object"
                )))
            }
        };

        if transaction.get(target, object_id)?.is_none() {
            return Err(invalid(format!(
                "Object \"{uri}\" for model \"{target}\" NotFound"
            )));
        }

        Ok(self.object_uri(target, object_id))
    }
}

fn scalar_from_native(
    param: &Parameter,
    kind: ParamKind,
    value: &Value,
) -> Result<Value, ConversionError> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    Ok(match kind {
        ParamKind::String => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(invalid("Invalid string")),
            };
            check_length(param, &text, "String value to long")?;
            Value::String(text)
        }
        ParamKind::Boolean => match value {
            Value::Bool(_) => value.clone(),
            _ => return Err(invalid("Invalid boolean")),
        },
        ParamKind::Integer => to_integer(value)
            .map(Value::from)
            .ok_or_else(|| invalid("Invalid int"))?,
        ParamKind::Float => to_float(value)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("Invalid float"))?,
        ParamKind::DateTime => Value::String(normalize_timestamp(value)?),
        ParamKind::Map => match value {
            Value::Object(_) => value.clone(),
            _ => return Err(invalid("Map must be an object")),
        },
        ParamKind::Model | ParamKind::File => match value {
            Value::String(_) => value.clone(),
            _ => return Err(invalid(format!("{} value must be a URI string", kind))),
        },
        ParamKind::User => Value::Null,
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_length(param: &Parameter, text: &str, message: &str) -> Result<(), ConversionError> {
    match param.length {
        Some(length) if text.chars().count() > length => Err(invalid(message)),
        _ => Ok(()),
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn to_bool(value: &Value) -> Result<bool, ConversionError> {
    let word = match value {
        Value::Bool(b) => return Ok(*b),
        Value::String(s) => s.to_ascii_lowercase(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    };

    match word.as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(invalid("Unable to convert to boolean")),
    }
}

fn normalize_timestamp(value: &Value) -> Result<String, ConversionError> {
    let message = "DateTime value must be an RFC 3339 string";
    let text = value.as_str().ok_or_else(|| invalid(message))?;
    OffsetDateTime::parse(text, &Rfc3339)
        .ok()
        .and_then(|parsed| parsed.format(&Rfc3339).ok())
        .ok_or_else(|| invalid(message))
}

fn check_scheme(param: &Parameter, value: &Value) -> Result<String, ConversionError> {
    let text = value
        .as_str()
        .ok_or_else(|| invalid("File value must be a URL string"))?;
    let scheme = url::Url::parse(text)
        .map(|url| url.scheme().to_string())
        .unwrap_or_default();

    if scheme.is_empty() || !param.allowed_schemes.contains(&scheme) {
        return Err(invalid(format!("Unknown or Invalid scheme \"{scheme}\"")));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{MemoryStore, TransactionFactory};
    use rstest::{fixture, rstest};
    use serde_json::json;

    const PERSON: &str = "/api/people/person";

    #[fixture]
    fn converter() -> Converter {
        Converter::new(Uri::new("/api/").unwrap())
    }

    fn open_transaction() -> TransactionGuard {
        let store = MemoryStore::new();
        store.insert(PERSON, "7", Map::new());
        let mut guard = TransactionGuard::new(store.open());
        guard.start().unwrap();
        guard
    }

    fn convert(converter: &Converter, param: &Parameter, value: Value) -> Result<Value, ConversionError> {
        converter.to_native(param, &value, &mut open_transaction())
    }

    // ---- scalar coercion -------------------------------------------------

    #[rstest]
    #[case(ParamKind::Integer, json!("42"), json!(42))]
    #[case(ParamKind::Integer, json!(7.0), json!(7))]
    #[case(ParamKind::Integer, json!(""), Value::Null)]
    #[case(ParamKind::Float, json!("3.5"), json!(3.5))]
    #[case(ParamKind::Boolean, json!("T"), json!(true))]
    #[case(ParamKind::Boolean, json!(0), json!(false))]
    #[case(ParamKind::String, json!(12), json!("12"))]
    #[case(ParamKind::Map, Value::Null, json!({}))]
    #[case(ParamKind::DateTime, json!("2024-03-01T10:00:00+00:00"), json!("2024-03-01T10:00:00Z"))]
    fn coerces_inbound_values(
        converter: Converter,
        #[case] kind: ParamKind,
        #[case] input: Value,
        #[case] expected: Value,
    ) {
        let param = Parameter::new("p", kind);
        assert_eq!(convert(&converter, &param, input).unwrap(), expected);
    }

    #[rstest]
    #[case(ParamKind::Integer, json!("4.5"), "Unable to convert to an int")]
    #[case(ParamKind::Float, json!("abc"), "Unable to convert to a float")]
    #[case(ParamKind::Boolean, json!("maybe"), "Unable to convert to boolean")]
    #[case(ParamKind::Map, json!([1]), "Map must be an object")]
    #[case(ParamKind::DateTime, json!("yesterday"), "DateTime value must be an RFC 3339 string")]
    fn rejects_bad_inbound_values(
        converter: Converter,
        #[case] kind: ParamKind,
        #[case] input: Value,
        #[case] message: &str,
    ) {
        let param = Parameter::new("p", kind);
        assert_eq!(
            convert(&converter, &param, input),
            Err(ConversionError::Invalid(message.to_string()))
        );
    }

    #[rstest]
    fn string_length_is_enforced(converter: Converter) {
        let param = Parameter::new("code", ParamKind::String).length(3);
        assert_eq!(convert(&converter, &param, json!("abc")).unwrap(), json!("abc"));
        assert!(convert(&converter, &param, json!("abcd")).is_err());
        assert!(converter.from_native(&param, &json!("abcd")).is_err());
    }

    #[rstest]
    fn choices_are_enforced(converter: Converter) {
        let param = Parameter::new("size", ParamKind::String).choices(vec![json!("S"), json!("L")]);
        assert!(convert(&converter, &param, json!("S")).is_ok());
        assert!(convert(&converter, &param, json!("M")).is_err());
    }

    // ---- arrays ----------------------------------------------------------

    #[rstest]
    fn arrays_convert_each_item(converter: Converter) {
        let param = Parameter::new("ids", ParamKind::Integer).array();
        assert_eq!(convert(&converter, &param, json!(["1", 2])).unwrap(), json!([1, 2]));
        assert_eq!(convert(&converter, &param, Value::Null).unwrap(), json!([]));
        assert!(convert(&converter, &param, json!(1)).is_err());
    }

    // ---- references --------------------------------------------------------

    #[rstest]
    fn model_reference_must_exist(converter: Converter) {
        let param = Parameter::new("owner", ParamKind::Model).model(PERSON);
        assert_eq!(
            convert(&converter, &param, json!("/api/people/person:7:")).unwrap(),
            json!("/api/people/person:7:")
        );
        assert!(convert(&converter, &param, json!("/api/people/person:8:")).is_err());
        assert!(convert(&converter, &param, json!("/api/people/pet:7:")).is_err());
        assert!(convert(&converter, &param, json!("/api/people/person")).is_err());
        assert!(convert(&converter, &param, json!("/api/people/person:7:8:")).is_err());
    }

    #[rstest]
    fn file_scheme_allow_list(converter: Converter) {
        let param = Parameter::new("cover", ParamKind::File).schemes(["https"]);
        assert!(convert(&converter, &param, json!("https://example.com/a.png")).is_ok());
        assert_eq!(
            convert(&converter, &param, json!("ftp://example.com/a.png")),
            Err(ConversionError::Invalid("Unknown or Invalid scheme \"ftp\"".into()))
        );
        assert!(convert(&converter, &param, json!("not a url")).is_err());
    }

    // ---- outbound ------------------------------------------------------------

    #[rstest]
    fn renders_outbound_values(converter: Converter) {
        let int = Parameter::new("n", ParamKind::Integer);
        assert_eq!(converter.from_native(&int, &json!("5")).unwrap(), json!(5));
        assert_eq!(converter.from_native(&int, &Value::Null).unwrap(), Value::Null);

        let none = Parameter::empty();
        assert_eq!(converter.from_native(&none, &json!({"x": 1})).unwrap(), Value::Null);

        let list = Parameter::new("tags", ParamKind::String).array();
        assert_eq!(converter.from_native(&list, &Value::Null).unwrap(), json!([]));
    }

    #[rstest]
    fn object_uri_round_trips(converter: Converter) {
        let uri = converter.object_uri(PERSON, "7");
        assert_eq!(uri, "/api/people/person:7:");
        let parts = converter.resolve(&uri).unwrap();
        assert_eq!(parts.namespace, vec!["people".to_string()]);
        assert_eq!(parts.model.as_deref(), Some("person"));
        assert_eq!(parts.id_list, Some(vec!["7".to_string()]));
    }
}
