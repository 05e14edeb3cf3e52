//! Models: typed resources with CRUD verbs and actions.
//!
//! # Data Flow
//! ```text
//! Dispatcher
//!     → Model::invoke / Model::invoke_action
//!         → not-allowed verb check        (VerbNotAllowed)
//!         → auth predicate                 (Authorization)
//!         → factory.open() → TransactionGuard::scoped
//!             → get / list / create / update / delete / Action::call
//!         → commit, or abort on any error
//!     → Response
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::protocol::{header_flag, ProtocolError, Response, Verb};
use crate::registry::action::Action;
use crate::registry::converter::{ConversionError, Converter};
use crate::registry::error::RegistryError;
use crate::registry::parameter::{Field, FieldMode, ParamKind, Parameter};
use crate::security::{CheckAuth, User};
use crate::transaction::{ListQuery, Object, TransactionFactory, TransactionGuard};

/// Page size used when a LIST does not send `COUNT`.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Paging and filter options of a LIST, taken from request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub filter: Option<String>,
    pub position: usize,
    pub count: usize,
    /// Return bare ids instead of object URIs.
    pub id_only: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: None,
            position: 0,
            count: DEFAULT_PAGE_SIZE,
            id_only: false,
        }
    }
}

/// One verb applied to a model by one user.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub verb: Verb,
    pub user: &'a User,
    /// Addressed ids, empty when the URI carries none.
    pub id_list: &'a [String],
    pub data: Option<&'a Value>,
    /// Return map-shaped results keyed by object URI.
    pub multi: bool,
    pub list: ListOptions,
}

impl<'a> Invocation<'a> {
    pub fn new(verb: Verb, user: &'a User) -> Self {
        Self {
            verb,
            user,
            id_list: &[],
            data: None,
            multi: false,
            list: ListOptions::default(),
        }
    }

    #[must_use]
    pub fn ids(mut self, id_list: &'a [String]) -> Self {
        self.id_list = id_list;
        self.multi = id_list.len() > 1;
        self
    }

    #[must_use]
    pub fn data(mut self, data: &'a Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    #[must_use]
    pub fn list(mut self, list: ListOptions) -> Self {
        self.list = list;
        self
    }
}

/// A resource type.
pub struct Model {
    name: String,
    doc: Option<String>,
    fields: Vec<Field>,
    id_field_name: Option<String>,
    factory: Arc<dyn TransactionFactory>,
    list_filters: Vec<(String, Vec<Parameter>)>,
    constant_sets: Vec<(String, Vec<Value>)>,
    not_allowed: Vec<Verb>,
    actions: Vec<Action>,
    check_auth: CheckAuth,
    path: Option<String>,
}

impl Model {
    /// Create a model whose transactions come from `factory`. Access is
    /// denied until a predicate is set with [`Model::check_auth`].
    pub fn new<F>(name: impl Into<String>, factory: F) -> Result<Self, RegistryError>
    where
        F: TransactionFactory + 'static,
    {
        let name = name.into();
        if !crate::protocol::uri::is_name(&name) {
            return Err(RegistryError::InvalidName {
                name,
                reason: "model names are limited to unreserved URI characters",
            });
        }

        Ok(Self {
            name,
            doc: None,
            fields: Vec::new(),
            id_field_name: None,
            factory: Arc::new(factory),
            list_filters: Vec::new(),
            constant_sets: Vec::new(),
            not_allowed: Vec::new(),
            actions: Vec::new(),
            check_auth: CheckAuth::deny(),
            path: None,
        })
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn field(mut self, field: Field) -> Result<Self, RegistryError> {
        if field.name().is_empty() {
            return Err(RegistryError::InvalidName {
                name: String::new(),
                reason: "fields must be named",
            });
        }
        if self.fields.iter().any(|f| f.name() == field.name()) {
            return Err(self.duplicate(field.name()));
        }
        self.fields.push(field);
        Ok(self)
    }

    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field_name = Some(name.into());
        self
    }

    pub fn list_filter(
        mut self,
        name: impl Into<String>,
        params: Vec<Parameter>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if self.list_filters.iter().any(|(existing, _)| *existing == name) {
            return Err(self.duplicate(&name));
        }
        self.list_filters.push((name, params));
        Ok(self)
    }

    #[must_use]
    pub fn constant_set(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.constant_sets.push((name.into(), values));
        self
    }

    /// Disable a verb. `OPTIONS` and `DESCRIBE` cannot be disabled.
    pub fn not_allowed(mut self, verb: Verb) -> Result<Self, RegistryError> {
        if matches!(verb, Verb::Options | Verb::Describe) {
            return Err(RegistryError::InvalidVerb {
                verb: verb.to_string(),
            });
        }
        if !self.not_allowed.contains(&verb) {
            self.not_allowed.push(verb);
        }
        Ok(self)
    }

    /// Set the auth predicate shared by the model and its actions.
    #[must_use]
    pub fn check_auth(mut self, check_auth: CheckAuth) -> Self {
        for action in &mut self.actions {
            action.rebind_auth(&check_auth);
        }
        self.check_auth = check_auth;
        self
    }

    pub fn action(mut self, action: Action) -> Result<Self, RegistryError> {
        self.add_action(action)?;
        Ok(self)
    }

    pub fn add_action(&mut self, mut action: Action) -> Result<(), RegistryError> {
        if self.actions.iter().any(|a| a.name() == action.name()) {
            return Err(self.duplicate(action.name()));
        }
        action.rebind_auth(&self.check_auth);
        self.actions.push(action);
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

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    #[must_use]
    pub fn find_action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|action| action.name() == name)
    }

    #[must_use]
    pub fn is_allowed(&self, verb: Verb) -> bool {
        !self.not_allowed.contains(&verb)
    }

    pub(crate) fn bind(&mut self, parent_path: &str) {
        let path = format!("{parent_path}{}", self.name);
        for action in &mut self.actions {
            action.bind(&path, &self.check_auth);
        }
        self.path = Some(path);
    }

    /// `(parameter name, target model path)` for every `Model` typed value.
    pub(crate) fn model_references(&self) -> Vec<(String, Option<String>)> {
        let params = self
            .fields
            .iter()
            .map(Field::param)
            .chain(self.list_filters.iter().flat_map(|(_, params)| params))
            .chain(self.actions.iter().flat_map(|action| action.parameters()));

        params
            .filter(|param| param.kind == Some(ParamKind::Model))
            .map(|param| (param.name.clone().unwrap_or_default(), param.model.clone()))
            .collect()
    }

    /// Path used for URIs and store calls; the bare name before binding.
    fn storage_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    fn duplicate(&self, name: &str) -> RegistryError {
        RegistryError::DuplicateName {
            name: name.to_string(),
            parent: self.storage_path().to_string(),
        }
    }

    /// Check the auth predicate for `verb`.
    pub fn authorize(&self, user: &User, verb: Verb, id_list: &[String]) -> Result<(), ProtocolError> {
        let ids = (!id_list.is_empty()).then_some(id_list);
        if self.check_auth.check(user, verb, ids) {
            Ok(())
        } else {
            Err(ProtocolError::Authorization)
        }
    }

    fn ensure_allowed(&self, verb: Verb) -> Result<(), ProtocolError> {
        if self.is_allowed(verb) {
            Ok(())
        } else {
            Err(ProtocolError::VerbNotAllowed { verb })
        }
    }

    /// Run a CRUD verb in a fresh transaction.
    pub fn invoke(&self, converter: &Converter, inv: &Invocation<'_>) -> Result<Response, ProtocolError> {
        if !inv.verb.requires_model() {
            return Err(ProtocolError::bad_request(format!(
                "Verb \"{}\" is not a model operation",
                inv.verb
            )));
        }
        self.ensure_allowed(inv.verb)?;
        self.authorize(inv.user, inv.verb, inv.id_list)?;

        TransactionGuard::new(self.factory.open()).scoped(|tx| match inv.verb {
            Verb::Get => self.get(converter, tx, inv.id_list, inv.multi),
            Verb::List => self.list(converter, tx, inv.data, &inv.list),
            Verb::Create => self.create(converter, tx, inv.data),
            Verb::Update => self.update(converter, tx, inv.id_list, inv.data, inv.multi),
            _ => self.delete(tx, inv.id_list),
        })
    }

    /// Run the named action in a fresh transaction.
    pub fn invoke_action(
        &self,
        converter: &Converter,
        action_name: &str,
        inv: &Invocation<'_>,
    ) -> Result<Response, ProtocolError> {
        let action = self
            .find_action(action_name)
            .ok_or_else(|| ProtocolError::ActionNotFound {
                name: action_name.to_string(),
            })?;
        self.ensure_allowed(Verb::Call)?;

        let ids = (!inv.id_list.is_empty()).then_some(inv.id_list);
        if !action.check_auth(inv.user, Verb::Call, ids) {
            return Err(ProtocolError::Authorization);
        }

        let data = inv.data.unwrap_or(&Value::Null);
        TransactionGuard::new(self.factory.open()).scoped(|tx| {
            action.call(
                converter,
                tx,
                self.storage_path(),
                inv.id_list,
                data,
                inv.user,
                inv.multi,
            )
        })
    }

    pub fn describe(&self, converter: &Converter) -> Response {
        let mut data = Map::new();
        data.insert("name".into(), Value::from(self.name.as_str()));
        data.insert("path".into(), self.path.clone().map_or(Value::Null, Value::String));
        if let Some(doc) = self.doc.as_ref().filter(|doc| !doc.is_empty()) {
            data.insert("doc".into(), Value::from(doc.as_str()));
        }

        let constants: Map<String, Value> = self
            .constant_sets
            .iter()
            .map(|(name, values)| (name.clone(), Value::Array(values.clone())))
            .collect();
        data.insert("constants".into(), Value::Object(constants));

        data.insert(
            "fields".into(),
            self.fields
                .iter()
                .map(|field| Value::Object(field.describe(converter)))
                .collect(),
        );
        if let Some(id_field_name) = &self.id_field_name {
            data.insert("id-field-name".into(), Value::from(id_field_name.as_str()));
        }
        data.insert(
            "actions".into(),
            self.actions
                .iter()
                .map(|action| action.path().map_or(Value::Null, Value::from))
                .collect(),
        );
        data.insert(
            "not-allowed-verbs".into(),
            self.not_allowed.iter().map(|verb| Value::from(verb.as_str())).collect(),
        );

        let list_filters: Map<String, Value> = self
            .list_filters
            .iter()
            .map(|(name, params)| {
                let described = params
                    .iter()
                    .map(|param| Value::Object(param.describe(converter)))
                    .collect();
                (name.clone(), Value::Array(described))
            })
            .collect();
        data.insert("list-filters".into(), Value::Object(list_filters));

        Response::new(200)
            .with_data(Value::Object(data))
            .with_header("Verb", "DESCRIBE")
            .with_header("Type", "Model")
            .with_header("Cache-Control", "max-age=0")
    }

    pub fn options() -> Response {
        Response::new(200).with_header("Allow", "OPTIONS, DESCRIBE, GET, LIST, CREATE, UPDATE, DELETE")
    }

    fn fetch(&self, transaction: &mut TransactionGuard, object_id: &str) -> Result<Object, ProtocolError> {
        transaction
            .get(self.storage_path(), object_id)?
            .ok_or_else(|| self.not_found(object_id))
    }

    fn not_found(&self, object_id: &str) -> ProtocolError {
        ProtocolError::ObjectNotFound {
            model_path: self.storage_path().to_string(),
            object_id: object_id.to_string(),
        }
    }

    fn object_uri(&self, converter: &Converter, object_id: &str) -> String {
        converter.object_uri(self.storage_path(), object_id)
    }

    pub fn get(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        id_list: &[String],
        multi: bool,
    ) -> Result<Response, ProtocolError> {
        let data = if multi {
            let mut result = Map::new();
            for object_id in id_list {
                let object = self.fetch(transaction, object_id)?;
                result.insert(self.object_uri(converter, object_id), Value::Object(object));
            }
            Value::Object(result)
        } else {
            let object_id = first_id(id_list)?;
            Value::Object(self.fetch(transaction, object_id)?)
        };

        Ok(Response::new(200)
            .with_data(data)
            .with_header("Verb", "GET")
            .with_header("Cache-Control", "no-cache")
            .with_header("Multi-Object", header_flag(multi)))
    }

    pub fn list(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        data: Option<&Value>,
        options: &ListOptions,
    ) -> Result<Response, ProtocolError> {
        let empty = Map::new();
        let data = match data {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ProtocolError::bad_request("LIST data must be a map or empty")),
        };

        let mut filter_values = Object::new();
        if let Some(filter_name) = &options.filter {
            let (_, params) = self
                .list_filters
                .iter()
                .find(|(name, _)| name == filter_name)
                .ok_or_else(|| ProtocolError::UnknownFilter {
                    name: filter_name.clone(),
                })?;

            let mut errors = Map::new();
            for param in params {
                let name = param.name.clone().unwrap_or_default();
                match data.get(&name) {
                    Some(value) => match converter.to_native(param, value, transaction) {
                        Ok(value) => {
                            filter_values.insert(name, value);
                        }
                        Err(ConversionError::Invalid(message)) => {
                            errors.insert(name, Value::from(format!("Invalid Value \"{message}\"")));
                        }
                        Err(ConversionError::Transaction(err)) => return Err(err.into()),
                    },
                    None => {
                        errors.insert(name, Value::from("Required Paramater"));
                    }
                }
            }
            if !errors.is_empty() {
                return Err(ProtocolError::invalid(errors));
            }
        }

        let query = ListQuery {
            filter: options.filter.clone(),
            filter_values,
            position: options.position,
            count: options.count,
        };
        let page = transaction.list(self.storage_path(), &query)?;

        let ids: Vec<Value> = page
            .ids
            .iter()
            .map(|object_id| {
                if options.id_only {
                    Value::from(object_id.as_str())
                } else {
                    Value::from(self.object_uri(converter, object_id))
                }
            })
            .collect();

        Ok(Response::new(200)
            .with_header("Verb", "LIST")
            .with_header("Cache-Control", "no-cache")
            .with_header("Count", ids.len().to_string())
            .with_header("Position", page.position.to_string())
            .with_header("Total", page.total.to_string())
            .with_header("Id-Only", header_flag(options.id_only))
            .with_data(Value::Array(ids)))
    }

    pub fn create(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        data: Option<&Value>,
    ) -> Result<Response, ProtocolError> {
        let Some(Value::Object(data)) = data else {
            return Err(ProtocolError::bad_request("CREATE data must be a map"));
        };
        let values = self.collect_values(converter, transaction, data, true)?;

        let (object_id, object) = transaction.create(self.storage_path(), values)?;
        Ok(Response::new(201)
            .with_data(Value::Object(object))
            .with_header("Verb", "CREATE")
            .with_header("Cache-Control", "no-cache")
            .with_header("Object-Id", self.object_uri(converter, &object_id)))
    }

    pub fn update(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        id_list: &[String],
        data: Option<&Value>,
        multi: bool,
    ) -> Result<Response, ProtocolError> {
        let Some(Value::Object(data)) = data else {
            return Err(ProtocolError::bad_request("UPDATE data must be a map"));
        };
        let values = self.collect_values(converter, transaction, data, false)?;

        let mut apply = |object_id: &str| -> Result<Object, ProtocolError> {
            transaction
                .update(self.storage_path(), object_id, values.clone())?
                .ok_or_else(|| self.not_found(object_id))
        };

        let result = if multi {
            let mut result = Map::new();
            for object_id in id_list {
                let object = apply(object_id)?;
                result.insert(self.object_uri(converter, object_id), Value::Object(object));
            }
            Value::Object(result)
        } else {
            Value::Object(apply(first_id(id_list)?)?)
        };

        Ok(Response::new(200)
            .with_data(result)
            .with_header("Verb", "UPDATE")
            .with_header("Cache-Control", "no-cache")
            .with_header("Multi-Object", header_flag(multi)))
    }

    pub fn delete(
        &self,
        transaction: &mut TransactionGuard,
        id_list: &[String],
    ) -> Result<Response, ProtocolError> {
        first_id(id_list)?;
        for object_id in id_list {
            if !transaction.delete(self.storage_path(), object_id)? {
                return Err(self.not_found(object_id));
            }
        }

        Ok(Response::new(200)
            .with_header("Verb", "DELETE")
            .with_header("Cache-Control", "no-cache"))
    }

    /// Validate and convert field values for a create (`creating`) or an
    /// update. Problems are collected per field.
    fn collect_values(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        data: &Map<String, Value>,
        creating: bool,
    ) -> Result<Object, ProtocolError> {
        let writable = |mode: FieldMode| match mode {
            FieldMode::ReadWrite => true,
            FieldMode::ReadCreate => creating,
            FieldMode::ReadOnly => false,
        };

        let mut errors = Map::new();
        for key in data.keys() {
            let field = self
                .fields
                .iter()
                .find(|field| field.name() == key)
                .ok_or_else(|| ProtocolError::bad_request(format!("no field named \"{key}\"")))?;
            if !writable(field.write_mode()) {
                errors.insert(key.clone(), Value::from("Not Writeable"));
            }
        }

        let mut values = Object::new();
        for field in self.fields.iter().filter(|field| writable(field.write_mode())) {
            let name = field.name().to_string();
            match data.get(&name) {
                Some(value) => match converter.to_native(field.param(), value, transaction) {
                    Ok(value) => {
                        values.insert(name, value);
                    }
                    Err(ConversionError::Invalid(message)) => {
                        errors.insert(name, Value::from(format!("Invalid Value \"{message}\"")));
                    }
                    Err(ConversionError::Transaction(err)) => return Err(err.into()),
                },
                None if creating => {
                    if let Some(default) = &field.param().default {
                        values.insert(name, default.clone());
                    } else if field.is_required() {
                        errors.insert(name, Value::from("Required Field"));
                    }
                }
                None => {}
            }
        }

        if errors.is_empty() {
            Ok(values)
        } else {
            Err(ProtocolError::invalid(errors))
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("fields", &self.fields.len())
            .field("actions", &self.actions)
            .field("not_allowed", &self.not_allowed)
            .finish_non_exhaustive()
    }
}

fn first_id(id_list: &[String]) -> Result<&str, ProtocolError> {
    id_list
        .first()
        .map(String::as_str)
        .ok_or_else(|| ProtocolError::bad_request("Request requires an id"))
}
