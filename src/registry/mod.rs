//! Registration and the namespace tree.
//!
//! # Responsibilities
//! - Collect namespaces, models and actions at startup
//! - Validate names, arity, defaults and model references
//! - Bind every element to its URI path
//! - Hand the immutable tree to the dispatcher as a [`Catalog`]
//!
//! # Data Flow
//! ```text
//! Registry::new(root path, version)
//!     → register_namespace / register_model
//!     → build()
//!         → bind paths (namespaces, models, actions)
//!         → check Model parameter references
//!     → Catalog { converter, root }  (shared read-only)
//! ```
//!
//! # Design Decisions
//! - No global state: the tree is owned by the `Catalog`
//! - Registration errors abort startup instead of failing requests

pub mod action;
pub mod converter;
pub mod error;
pub mod model;
pub mod namespace;
pub mod parameter;

use std::collections::HashSet;

pub use action::{Action, ActionError, ActionFunc, ActionResult, CallContext};
pub use converter::{ConversionError, Converter};
pub use error::RegistryError;
pub use model::{Invocation, ListOptions, Model, DEFAULT_PAGE_SIZE};
pub use namespace::{Element, ElementRef, Namespace};
pub use parameter::{Field, FieldMode, ParamKind, Parameter};

use crate::protocol::{Uri, UriParts, DEFAULT_MULTI_URI_MAX};

/// Startup-time builder of the namespace tree.
#[derive(Debug)]
pub struct Registry {
    uri: Uri,
    root: Namespace,
    multi_uri_max: usize,
}

impl Registry {
    pub fn new(root_path: &str, root_version: &str) -> Result<Self, RegistryError> {
        Ok(Self {
            uri: Uri::new(root_path)?,
            root: Namespace::root(root_version),
            multi_uri_max: DEFAULT_MULTI_URI_MAX,
        })
    }

    /// Maximum number of ids a single request may address.
    #[must_use]
    pub fn multi_uri_max(mut self, multi_uri_max: usize) -> Self {
        self.multi_uri_max = multi_uri_max;
        self
    }

    /// Add `namespace` below the namespace at `parent_path`.
    pub fn register_namespace(
        &mut self,
        parent_path: &str,
        namespace: Namespace,
    ) -> Result<(), RegistryError> {
        tracing::debug!(parent = %parent_path, name = %namespace.name(), "Registering namespace");
        self.namespace_at(parent_path)?.add_element(namespace)
    }

    /// Add `model` to the namespace at `parent_path`.
    pub fn register_model(&mut self, parent_path: &str, model: Model) -> Result<(), RegistryError> {
        tracing::debug!(parent = %parent_path, name = %model.name(), "Registering model");
        self.namespace_at(parent_path)?.add_element(model)
    }

    fn namespace_at(&mut self, path: &str) -> Result<&mut Namespace, RegistryError> {
        let not_found = || RegistryError::PathNotFound {
            path: path.to_string(),
        };
        let parts = self.uri.split(path, false).map_err(|_| not_found())?;
        if parts.model.is_some() {
            return Err(not_found());
        }

        let mut namespace = &mut self.root;
        for name in &parts.namespace {
            namespace = namespace.child_namespace_mut(name).ok_or_else(not_found)?;
        }
        Ok(namespace)
    }

    /// Bind paths, check references and freeze the tree.
    pub fn build(mut self) -> Result<Catalog, RegistryError> {
        self.root.bind(self.uri.root_path().to_string());

        let models = self.root.models();
        let known: HashSet<&str> = models.iter().filter_map(|model| model.path()).collect();
        for model in &models {
            for (parameter, target) in model.model_references() {
                let target = target.unwrap_or_default();
                if !known.contains(target.as_str()) {
                    return Err(RegistryError::UnresolvedModel {
                        parameter,
                        model: target,
                    });
                }
            }
        }

        tracing::info!(
            root = %self.uri.root_path(),
            models = models.len(),
            multi_uri_max = self.multi_uri_max,
            "Registry built"
        );

        Ok(Catalog {
            converter: Converter::new(self.uri),
            root: self.root,
            multi_uri_max: self.multi_uri_max,
        })
    }
}

/// The frozen namespace tree and its converter.
#[derive(Debug)]
pub struct Catalog {
    converter: Converter,
    root: Namespace,
    multi_uri_max: usize,
}

impl Catalog {
    #[must_use]
    pub const fn converter(&self) -> &Converter {
        &self.converter
    }

    #[must_use]
    pub const fn root(&self) -> &Namespace {
        &self.root
    }

    #[must_use]
    pub const fn multi_uri_max(&self) -> usize {
        self.multi_uri_max
    }

    #[must_use]
    pub fn lookup(&self, parts: &UriParts) -> Option<ElementRef<'_>> {
        self.root.lookup(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CheckAuth;
    use crate::transaction::NullStore;

    fn library() -> Namespace {
        Namespace::new("library", "1.0").unwrap()
    }

    #[test]
    fn builds_nested_paths() {
        let mut registry = Registry::new("/api/", "0.0").unwrap();
        registry.register_namespace("/api/", library()).unwrap();
        registry
            .register_model("/api/library/", Model::new("book", NullStore).unwrap())
            .unwrap();

        let catalog = registry.build().unwrap();
        let parts = catalog.converter().resolve("/api/library/book").unwrap();
        match catalog.lookup(&parts) {
            Some(ElementRef::Model(model)) => assert_eq!(model.path(), Some("/api/library/book")),
            other => panic!("unexpected lookup result {other:?}"),
        }
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut registry = Registry::new("/api/", "0.0").unwrap();
        let err = registry
            .register_model("/api/nope/", Model::new("book", NullStore).unwrap())
            .unwrap_err();
        assert_eq!(err, RegistryError::PathNotFound { path: "/api/nope/".into() });
    }

    #[test]
    fn unresolved_model_reference_fails_build() {
        let loan = Model::new("loan", NullStore)
            .unwrap()
            .field(Field::new(
                Parameter::new("book", ParamKind::Model).model("/api/library/book"),
            ))
            .unwrap()
            .check_auth(CheckAuth::permit());

        let mut registry = Registry::new("/api/", "0.0").unwrap();
        registry.register_namespace("/api/", library()).unwrap();
        registry.register_model("/api/library/", loan).unwrap();

        let err = registry.build().unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnresolvedModel {
                parameter: "book".into(),
                model: "/api/library/book".into()
            }
        );
    }

    #[test]
    fn invalid_root_path() {
        assert!(matches!(Registry::new("api", "0.0"), Err(RegistryError::Uri(_))));
    }
}
