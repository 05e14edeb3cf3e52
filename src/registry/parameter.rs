//! Typed value descriptors for fields, action parameters and return values.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::registry::converter::Converter;
use crate::registry::error::RegistryError;

/// The value kinds the protocol knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Map,
    /// Reference to an object of another model, carried as its URI.
    Model,
    /// URL of a file.
    File,
    /// The calling user, injected by the server and hidden from clients.
    User,
}

impl ParamKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::DateTime => "DateTime",
            Self::Map => "Map",
            Self::Model => "Model",
            Self::File => "File",
            Self::User => "_USER_",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "String" => Self::String,
            "Integer" => Self::Integer,
            "Float" => Self::Float,
            "Boolean" => Self::Boolean,
            "DateTime" => Self::DateTime,
            "Map" => Self::Map,
            "Model" => Self::Model,
            "File" => Self::File,
            "_USER_" => Self::User,
            other => {
                return Err(RegistryError::UnknownParameterType {
                    name: other.to_string(),
                })
            }
        })
    }
}

/// Describes one typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
    pub name: Option<String>,
    /// `None` describes "no value", e.g. an action that returns nothing.
    pub kind: Option<ParamKind>,
    pub doc: Option<String>,
    /// Maximum length of `String` values, in characters.
    pub length: Option<usize>,
    pub is_array: bool,
    /// Target model path of `Model` values.
    pub model: Option<String>,
    /// URL schemes accepted for `File` values.
    pub allowed_schemes: Vec<String>,
    pub choices: Vec<Value>,
    pub default: Option<Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: Some(name.into()),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Build from a type name such as `"Integer"` or `"_USER_"`.
    pub fn parse(name: impl Into<String>, type_name: &str) -> Result<Self, RegistryError> {
        Ok(Self::new(name, type_name.parse()?))
    }

    /// An unnamed parameter, used for return values.
    pub fn unnamed(kind: ParamKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// No value at all.
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    #[must_use]
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    #[must_use]
    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    #[must_use]
    pub fn model(mut self, model_path: impl Into<String>) -> Self {
        self.model = Some(model_path.into());
        self
    }

    #[must_use]
    pub fn schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn choices(mut self, choices: Vec<Value>) -> Self {
        self.choices = choices;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        self.kind == Some(ParamKind::User)
    }

    /// Introspection form of the parameter.
    pub fn describe(&self, converter: &Converter) -> Map<String, Value> {
        let mut result = Map::new();
        result.insert("name".into(), self.name.clone().map_or(Value::Null, Value::String));
        result.insert(
            "type".into(),
            self.kind.map_or(Value::Null, |kind| Value::from(kind.as_str())),
        );
        if let Some(doc) = self.doc.as_ref().filter(|doc| !doc.is_empty()) {
            result.insert("doc".into(), Value::from(doc.as_str()));
        }

        let Some(kind) = self.kind else {
            return result;
        };

        match kind {
            ParamKind::String => {
                if let Some(length) = self.length {
                    result.insert("length".into(), Value::from(length));
                }
            }
            ParamKind::Model => {
                result.insert("uri".into(), self.model.clone().map_or(Value::Null, Value::String));
            }
            ParamKind::File => {
                result.insert("allowed_schemes".into(), Value::from(self.allowed_schemes.clone()));
            }
            _ => {}
        }

        if !self.choices.is_empty() {
            result.insert("choices".into(), Value::Array(self.choices.clone()));
        }
        if self.is_array {
            result.insert("is_array".into(), Value::Bool(true));
        }
        if let Some(default) = &self.default {
            let rendered = converter.from_native(self, default).unwrap_or_else(|err| {
                tracing::warn!(parameter = ?self.name, error = %err, "Default does not convert");
                default.clone()
            });
            result.insert("default".into(), rendered);
        }

        result
    }
}

/// Write access of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMode {
    /// Writable on create and update.
    ReadWrite,
    /// Writable on create only.
    ReadCreate,
    ReadOnly,
}

impl FieldMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadWrite => "RW",
            Self::ReadCreate => "RC",
            Self::ReadOnly => "RO",
        }
    }
}

/// A model field: a named parameter with a write mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    param: Parameter,
    mode: FieldMode,
    required: bool,
}

impl Field {
    /// A required read-write field.
    pub fn new(param: Parameter) -> Self {
        Self {
            param,
            mode: FieldMode::ReadWrite,
            required: true,
        }
    }

    #[must_use]
    pub fn mode(mut self, mode: FieldMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn read_only(self) -> Self {
        self.mode(FieldMode::ReadOnly)
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.param.name.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub const fn param(&self) -> &Parameter {
        &self.param
    }

    #[must_use]
    pub const fn write_mode(&self) -> FieldMode {
        self.mode
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    pub fn describe(&self, converter: &Converter) -> Map<String, Value> {
        let mut result = self.param.describe(converter);
        result.insert("mode".into(), Value::from(self.mode.as_str()));
        result.insert("required".into(), Value::Bool(self.required));
        result
    }
}
