//! Namespaces: the hierarchical containers of models.

use serde_json::{Map, Value};

use crate::protocol::{ProtocolError, Response, UriParts, Verb};
use crate::registry::action::Action;
use crate::registry::error::RegistryError;
use crate::registry::model::Model;
use crate::security::{CheckAuth, User};

/// Name reserved for the root namespace.
pub const ROOT_NAME: &str = "root";

/// A child of a namespace.
#[derive(Debug)]
pub enum Element {
    Namespace(Namespace),
    Model(Model),
}

impl Element {
    fn name(&self) -> &str {
        match self {
            Element::Namespace(namespace) => &namespace.name,
            Element::Model(model) => model.name(),
        }
    }
}

impl From<Namespace> for Element {
    fn from(namespace: Namespace) -> Self {
        Element::Namespace(namespace)
    }
}

impl From<Model> for Element {
    fn from(model: Model) -> Self {
        Element::Model(model)
    }
}

/// What a URI resolves to.
#[derive(Debug, Clone, Copy)]
pub enum ElementRef<'a> {
    Namespace(&'a Namespace),
    Model(&'a Model),
    Action(&'a Model, &'a Action),
}

/// A container of namespaces and models.
#[derive(Debug)]
pub struct Namespace {
    name: String,
    version: String,
    doc: Option<String>,
    children: Vec<Element>,
    check_auth: CheckAuth,
    path: Option<String>,
}

impl Namespace {
    /// Create a namespace. Names are ASCII alphanumeric and `root` is
    /// reserved.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, RegistryError> {
        let name = name.into();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RegistryError::InvalidName {
                name,
                reason: "namespace names must be ASCII alphanumeric",
            });
        }
        if name == ROOT_NAME {
            return Err(RegistryError::InvalidName {
                name,
                reason: "\"root\" is reserved",
            });
        }

        Ok(Self::unchecked(name, version.into()))
    }

    pub(crate) fn root(version: impl Into<String>) -> Self {
        Self::unchecked(ROOT_NAME.to_string(), version.into())
    }

    fn unchecked(name: String, version: String) -> Self {
        Self {
            name,
            version,
            doc: None,
            children: Vec::new(),
            check_auth: CheckAuth::permit(),
            path: None,
        }
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Predicate checked for DESCRIBE of this namespace.
    #[must_use]
    pub fn check_auth(mut self, check_auth: CheckAuth) -> Self {
        self.check_auth = check_auth;
        self
    }

    pub fn with_element(mut self, element: impl Into<Element>) -> Result<Self, RegistryError> {
        self.add_element(element)?;
        Ok(self)
    }

    pub fn add_element(&mut self, element: impl Into<Element>) -> Result<(), RegistryError> {
        let element = element.into();
        if self.children.iter().any(|child| child.name() == element.name()) {
            return Err(RegistryError::DuplicateName {
                name: element.name().to_string(),
                parent: self.path.clone().unwrap_or_else(|| self.name.clone()),
            });
        }
        self.children.push(element);
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub(crate) fn child_namespace_mut(&mut self, name: &str) -> Option<&mut Namespace> {
        self.children.iter_mut().find_map(|child| match child {
            Element::Namespace(namespace) if namespace.name == name => Some(namespace),
            _ => None,
        })
    }

    fn child_namespace(&self, name: &str) -> Option<&Namespace> {
        self.children.iter().find_map(|child| match child {
            Element::Namespace(namespace) if namespace.name == name => Some(namespace),
            _ => None,
        })
    }

    fn child_model(&self, name: &str) -> Option<&Model> {
        self.children.iter().find_map(|child| match child {
            Element::Model(model) if model.name() == name => Some(model),
            _ => None,
        })
    }

    /// Assign paths to this namespace and everything below it.
    pub(crate) fn bind(&mut self, path: String) {
        for child in &mut self.children {
            match child {
                Element::Namespace(namespace) => {
                    let child_path = format!("{path}{}/", namespace.name);
                    namespace.bind(child_path);
                }
                Element::Model(model) => model.bind(&path),
            }
        }
        self.path = Some(path);
    }

    /// Every model below this namespace, depth first.
    pub(crate) fn models(&self) -> Vec<&Model> {
        let mut models = Vec::new();
        for child in &self.children {
            match child {
                Element::Namespace(namespace) => models.extend(namespace.models()),
                Element::Model(model) => models.push(model),
            }
        }
        models
    }

    /// Resolve split URI parts below this namespace.
    #[must_use]
    pub fn lookup(&self, parts: &UriParts) -> Option<ElementRef<'_>> {
        let mut namespace = self;
        for name in &parts.namespace {
            namespace = namespace.child_namespace(name)?;
        }

        let Some(model_name) = &parts.model else {
            return Some(ElementRef::Namespace(namespace));
        };
        let model = namespace.child_model(model_name)?;

        match &parts.action {
            None => Some(ElementRef::Model(model)),
            Some(action_name) => model
                .find_action(action_name)
                .map(|action| ElementRef::Action(model, action)),
        }
    }

    pub fn authorize(&self, user: &User) -> Result<(), ProtocolError> {
        if self.check_auth.check(user, Verb::Describe, None) {
            Ok(())
        } else {
            Err(ProtocolError::Authorization)
        }
    }

    pub fn describe(&self, multi_uri_max: usize) -> Response {
        let mut data = Map::new();
        data.insert("name".into(), Value::from(self.name.as_str()));
        data.insert("path".into(), self.path.clone().map_or(Value::Null, Value::String));
        data.insert("api-version".into(), Value::from(self.version.as_str()));
        data.insert("multi-uri-max".into(), Value::from(multi_uri_max));
        if let Some(doc) = self.doc.as_ref().filter(|doc| !doc.is_empty()) {
            data.insert("doc".into(), Value::from(doc.as_str()));
        }

        let mut namespaces = Vec::new();
        let mut models = Vec::new();
        for child in &self.children {
            match child {
                Element::Namespace(namespace) => {
                    namespaces.push(namespace.path.clone().map_or(Value::Null, Value::String));
                }
                Element::Model(model) => {
                    models.push(model.path().map_or(Value::Null, Value::from));
                }
            }
        }
        data.insert("namespaces".into(), Value::Array(namespaces));
        data.insert("models".into(), Value::Array(models));

        Response::new(200)
            .with_data(Value::Object(data))
            .with_header("Verb", "DESCRIBE")
            .with_header("Type", "Namespace")
            .with_header("Cache-Control", "max-age=0")
    }

    pub fn options() -> Response {
        Response::new(200)
            .with_header("Allow", "OPTIONS, DESCRIBE")
            .with_header("Cache-Control", "max-age=0")
    }
}
