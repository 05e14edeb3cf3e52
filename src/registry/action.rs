//! Actions: named RPC operations attached to a model.
//!
//! # Responsibilities
//! - Validate the declared parameter list against the function arity
//! - Convert call arguments, inject the calling user, apply defaults
//! - Run static actions once and instance actions per addressed object
//!
//! # Design Decisions
//! - Functions declare their arity explicitly; there is no signature
//!   introspection
//! - Function-level defaults fill the trailing parameters
//! - Auth is the owning model's predicate closed over the action name

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::{header_flag, ProtocolError, Response, Verb};
use crate::registry::converter::{ConversionError, Converter};
use crate::registry::error::RegistryError;
use crate::registry::parameter::Parameter;
use crate::security::{ActionAuth, CheckAuth, User};
use crate::transaction::{Object, TransactionError, TransactionGuard};

/// Errors an action function may return.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The arguments are unacceptable (400).
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The action failed (500).
    #[error("{0}")]
    Failed(String),
}

impl From<ActionError> for ProtocolError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Invalid(message) => ProtocolError::bad_request(message),
            ActionError::Transaction(err) => ProtocolError::Transaction(err),
            ActionError::Failed(message) => ProtocolError::server(message),
        }
    }
}

pub type ActionResult = Result<Value, ActionError>;

/// What an action function sees besides its arguments.
pub struct CallContext<'a> {
    pub user: &'a User,
    /// Path of the owning model.
    pub model_path: &'a str,
    /// Id and stored form of the target object, for instance actions.
    pub target: Option<(&'a str, &'a Object)>,
    /// The request transaction, already started.
    pub transaction: &'a mut TransactionGuard,
}

type Func = dyn Fn(&mut CallContext<'_>, &[Value]) -> ActionResult + Send + Sync;

/// A callable with a declared arity and optional trailing defaults.
#[derive(Clone)]
pub struct ActionFunc {
    arity: usize,
    defaults: Vec<Value>,
    func: Arc<Func>,
}

impl ActionFunc {
    pub fn new<F>(arity: usize, func: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[Value]) -> ActionResult + Send + Sync + 'static,
    {
        Self {
            arity,
            defaults: Vec::new(),
            func: Arc::new(func),
        }
    }

    /// Defaults for the last `defaults.len()` arguments.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Vec<Value>) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }
}

impl fmt::Debug for ActionFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFunc")
            .field("arity", &self.arity)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// A named operation on a model.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    doc: Option<String>,
    func: ActionFunc,
    return_param: Parameter,
    params: Vec<Parameter>,
    is_static: bool,
    path: Option<String>,
    auth: ActionAuth,
}

impl Action {
    /// Create a static action.
    ///
    /// Fails when the parameter count differs from the function arity, when
    /// a parameter is unnamed, or when defaults do not form a contiguous
    /// suffix.
    pub fn new(
        name: impl Into<String>,
        func: ActionFunc,
        params: Vec<Parameter>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        if !crate::protocol::uri::is_name(&name) {
            return Err(RegistryError::InvalidName {
                name,
                reason: "action names are limited to unreserved URI characters",
            });
        }

        if params.len() != func.arity {
            return Err(RegistryError::ParameterArity {
                action: name,
                declared: params.len(),
                expected: func.arity,
            });
        }

        let mut params = params;
        for param in &params {
            if param.name.as_deref().map_or(true, str::is_empty) {
                return Err(RegistryError::InvalidName {
                    name: String::new(),
                    reason: "action parameters must be named",
                });
            }
        }

        if func.defaults.len() > params.len() {
            return Err(RegistryError::DefaultOrder {
                action: name,
                parameter: String::new(),
            });
        }
        let first_default = params.len() - func.defaults.len();
        for (param, default) in params[first_default..].iter_mut().zip(&func.defaults) {
            param.default.get_or_insert_with(|| default.clone());
        }

        let mut seen_default = false;
        for param in params.iter().filter(|param| !param.is_user()) {
            if param.default.is_some() {
                seen_default = true;
            } else if seen_default {
                return Err(RegistryError::DefaultOrder {
                    action: name,
                    parameter: param.name.clone().unwrap_or_default(),
                });
            }
        }

        let auth = CheckAuth::deny().bind_action(name.clone());
        Ok(Self {
            name,
            doc: None,
            func,
            return_param: Parameter::empty(),
            params,
            is_static: true,
            path: None,
            auth,
        })
    }

    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Declare the return value. Its name is dropped.
    #[must_use]
    pub fn returns(mut self, mut param: Parameter) -> Self {
        param.name = None;
        self.return_param = param;
        self
    }

    /// Make this an instance action, called once per addressed object.
    #[must_use]
    pub fn instance(mut self) -> Self {
        self.is_static = false;
        self
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
    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    pub(crate) fn bind(&mut self, model_path: &str, check_auth: &CheckAuth) {
        self.path = Some(format!("{model_path}({})", self.name));
        self.rebind_auth(check_auth);
    }

    pub(crate) fn rebind_auth(&mut self, check_auth: &CheckAuth) {
        self.auth = check_auth.bind_action(self.name.clone());
    }

    #[must_use]
    pub fn check_auth(&self, user: &User, verb: Verb, id_list: Option<&[String]>) -> bool {
        self.auth.check(user, verb, id_list)
    }

    pub fn describe(&self, converter: &Converter) -> Response {
        let mut return_type = self.return_param.describe(converter);
        return_type.remove("name");

        let mut data = Map::new();
        data.insert("name".into(), Value::from(self.name.as_str()));
        data.insert("path".into(), self.path.clone().map_or(Value::Null, Value::String));
        data.insert("return-type".into(), Value::Object(return_type));
        data.insert("static".into(), Value::Bool(self.is_static));
        if let Some(doc) = self.doc.as_ref().filter(|doc| !doc.is_empty()) {
            data.insert("doc".into(), Value::from(doc.as_str()));
        }
        data.insert(
            "paramaters".into(),
            Value::Array(
                self.params
                    .iter()
                    .filter(|param| !param.is_user())
                    .map(|param| Value::Object(param.describe(converter)))
                    .collect(),
            ),
        );

        Response::new(200)
            .with_data(Value::Object(data))
            .with_header("Verb", "DESCRIBE")
            .with_header("Type", "Action")
            .with_header("Cache-Control", "max-age=0")
    }

    pub fn options() -> Response {
        Response::new(200).with_header("Allow", "OPTIONS, DESCRIBE, CALL")
    }

    /// Run the action inside an already started transaction.
    ///
    /// `id_list` is empty for static calls. With `multi` the result is a
    /// map of object URI to return value.
    #[allow(clippy::too_many_arguments)]
    pub fn call(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        model_path: &str,
        id_list: &[String],
        data: &Value,
        user: &User,
        multi: bool,
    ) -> Result<Response, ProtocolError> {
        let empty = Map::new();
        let data = match data {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(ProtocolError::bad_request("CALL data must be a map")),
        };

        let args = self.convert_args(converter, transaction, data, user)?;

        let result = if id_list.is_empty() {
            if !self.is_static {
                return Err(ProtocolError::bad_request(
                    "Non-Static Actions should be passed ids",
                ));
            }
            let mut ctx = CallContext {
                user,
                model_path,
                target: None,
                transaction,
            };
            let value = (self.func.func)(&mut ctx, &args)?;
            self.render(converter, &value)?
        } else {
            if self.is_static {
                return Err(ProtocolError::bad_request(
                    "Static Actions should not be passed ids",
                ));
            }

            if multi {
                let mut results = Map::new();
                for object_id in id_list {
                    let value =
                        self.call_on(converter, transaction, model_path, object_id, &args, user)?;
                    results.insert(converter.object_uri(model_path, object_id), value);
                }
                Value::Object(results)
            } else {
                self.call_on(converter, transaction, model_path, &id_list[0], &args, user)?
            }
        };

        Ok(Response::new(200)
            .with_data(result)
            .with_header("Verb", "CALL")
            .with_header("Cache-Control", "no-cache")
            .with_header("Multi-Object", header_flag(multi)))
    }

    fn call_on(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        model_path: &str,
        object_id: &str,
        args: &[Value],
        user: &User,
    ) -> Result<Value, ProtocolError> {
        let object = transaction
            .get(model_path, object_id)?
            .ok_or_else(|| ProtocolError::ObjectNotFound {
                model_path: model_path.to_string(),
                object_id: object_id.to_string(),
            })?;

        let mut ctx = CallContext {
            user,
            model_path,
            target: Some((object_id, &object)),
            transaction,
        };
        let value = (self.func.func)(&mut ctx, args)?;
        self.render(converter, &value)
    }

    fn convert_args(
        &self,
        converter: &Converter,
        transaction: &mut TransactionGuard,
        data: &Map<String, Value>,
        user: &User,
    ) -> Result<Vec<Value>, ProtocolError> {
        let mut args = Vec::with_capacity(self.params.len());
        let mut errors = Map::new();

        for param in &self.params {
            let name = param.name.clone().unwrap_or_default();
            if param.is_user() {
                let value = serde_json::to_value(user)
                    .map_err(|err| ProtocolError::server(format!("Unable to encode user: {err}")))?;
                args.push(value);
                continue;
            }

            match data.get(&name) {
                Some(value) => match converter.to_native(param, value, transaction) {
                    Ok(value) => args.push(value),
                    Err(ConversionError::Invalid(message)) => {
                        errors.insert(name, Value::from(format!("Invalid Value \"{message}\"")));
                    }
                    Err(ConversionError::Transaction(err)) => return Err(err.into()),
                },
                None => match &param.default {
                    Some(default) => args.push(default.clone()),
                    None => {
                        errors.insert(name, Value::from("Required Paramater"));
                    }
                },
            }
        }

        if errors.is_empty() {
            Ok(args)
        } else {
            Err(ProtocolError::invalid(errors))
        }
    }

    fn render(&self, converter: &Converter, value: &Value) -> Result<Value, ProtocolError> {
        converter
            .from_native(&self.return_param, value)
            .map_err(|err| ProtocolError::bad_request(format!("Invalid Result Value: \"{err}\"")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Uri;
    use crate::registry::parameter::ParamKind;
    use crate::transaction::{MemoryStore, TransactionFactory};
    use serde_json::json;

    const COUNTER: &str = "/api/tools/counter";

    fn converter() -> Converter {
        Converter::new(Uri::new("/api/").unwrap())
    }

    fn started(store: &MemoryStore) -> TransactionGuard {
        let mut guard = TransactionGuard::new(store.open());
        guard.start().unwrap();
        guard
    }

    fn add() -> Action {
        let func = ActionFunc::new(2, |_, args| {
            let a = args[0].as_i64().unwrap_or_default();
            let b = args[1].as_i64().unwrap_or_default();
            Ok(json!(a + b))
        })
        .with_defaults(vec![json!(10)]);

        Action::new(
            "add",
            func,
            vec![
                Parameter::new("a", ParamKind::Integer),
                Parameter::new("b", ParamKind::Integer),
            ],
        )
        .unwrap()
        .returns(Parameter::new("sum", ParamKind::Integer))
    }

    #[test]
    fn arity_mismatch_fails_registration() {
        let func = ActionFunc::new(1, |_, _| Ok(Value::Null));
        let err = Action::new(
            "bad",
            func,
            vec![
                Parameter::new("a", ParamKind::String),
                Parameter::new("b", ParamKind::String),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::ParameterArity {
                action: "bad".into(),
                declared: 2,
                expected: 1
            }
        );
    }

    #[test]
    fn defaults_must_be_a_suffix() {
        let func = ActionFunc::new(2, |_, _| Ok(Value::Null));
        let err = Action::new(
            "gap",
            func,
            vec![
                Parameter::new("a", ParamKind::String).default_value(json!("x")),
                Parameter::new("b", ParamKind::String),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::DefaultOrder { parameter, .. } if parameter == "b"));
    }

    #[test]
    fn user_parameter_does_not_break_default_suffix() {
        let func = ActionFunc::new(2, |_, _| Ok(Value::Null)).with_defaults(vec![json!(null)]);
        let action = Action::new(
            "whoami",
            func,
            vec![
                Parameter::new("note", ParamKind::String).default_value(json!("")),
                Parameter::new("user", ParamKind::User),
            ],
        );
        assert!(action.is_ok());
    }

    #[test]
    fn describe_hides_user_and_names_return_type() {
        let func = ActionFunc::new(2, |_, _| Ok(Value::Null));
        let mut action = Action::new(
            "stamp",
            func,
            vec![
                Parameter::new("label", ParamKind::String),
                Parameter::new("caller", ParamKind::User),
            ],
        )
        .unwrap()
        .returns(Parameter::new("ignored", ParamKind::Boolean))
        .doc("Stamp a label");
        action.bind(COUNTER, &CheckAuth::permit());

        let response = action.describe(&converter());
        assert_eq!(response.header("Type"), Some("Action"));
        assert_eq!(
            response.data,
            Some(json!({
                "name": "stamp",
                "path": "/api/tools/counter(stamp)",
                "return-type": {"type": "Boolean"},
                "static": true,
                "doc": "Stamp a label",
                "paramaters": [{"name": "label", "type": "String"}]
            }))
        );
    }

    #[test]
    fn static_call_applies_defaults_and_converts() {
        let store = MemoryStore::new();
        let mut tx = started(&store);
        let user = User::anonymous();

        let response = add()
            .call(&converter(), &mut tx, COUNTER, &[], &json!({"a": "5"}), &user, false)
            .unwrap();
        assert_eq!(response.data, Some(json!(15)));
        assert_eq!(response.header("Multi-Object"), Some("False"));
    }

    #[test]
    fn reports_every_bad_argument() {
        let func = ActionFunc::new(2, |_, _| Ok(Value::Null));
        let action = Action::new(
            "pair",
            func,
            vec![
                Parameter::new("a", ParamKind::Integer),
                Parameter::new("b", ParamKind::Integer),
            ],
        )
        .unwrap();
        let store = MemoryStore::new();
        let mut tx = started(&store);

        let err = action
            .call(&converter(), &mut tx, COUNTER, &[], &json!({"a": "x"}), &User::anonymous(), false)
            .unwrap_err();
        match err {
            ProtocolError::InvalidRequest { detail, .. } => {
                assert_eq!(detail["a"], json!("Invalid Value \"Unable to convert to an int\""));
                assert_eq!(detail["b"], json!("Required Paramater"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn static_and_instance_id_rules() {
        let store = MemoryStore::new();
        store.insert(COUNTER, "1", Map::new());
        let mut tx = started(&store);
        let user = User::anonymous();
        let ids = vec!["1".to_string()];

        let err = add()
            .call(&converter(), &mut tx, COUNTER, &ids, &json!({"a": 1}), &user, false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Static Actions should not be passed ids");

        let instance = add().instance();
        let err = instance
            .call(&converter(), &mut tx, COUNTER, &[], &json!({"a": 1}), &user, false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Non-Static Actions should be passed ids");
    }

    #[test]
    fn user_parameter_receives_the_encoded_caller() {
        let store = MemoryStore::new();
        let func = ActionFunc::new(1, |_, args| Ok(args[0].clone()));
        let action = Action::new("whoami", func, vec![Parameter::new("caller", ParamKind::User)])
            .unwrap()
            .returns(Parameter::unnamed(ParamKind::Map));

        let mut tx = started(&store);
        let anonymous = action
            .call(&converter(), &mut tx, COUNTER, &[], &Value::Null, &User::anonymous(), false)
            .unwrap();
        assert_eq!(anonymous.data, Some(json!({"id": null, "superuser": false})));

        let admin = action
            .call(&converter(), &mut tx, COUNTER, &[], &Value::Null, &User::superuser("root"), false)
            .unwrap();
        assert_eq!(admin.data, Some(json!({"id": "root", "superuser": true})));
    }

    #[test]
    fn instance_call_sees_target_and_user() {
        let store = MemoryStore::new();
        store.insert(COUNTER, "1", json!({"value": 3}).as_object().cloned().unwrap());
        store.insert(COUNTER, "2", json!({"value": 4}).as_object().cloned().unwrap());

        let func = ActionFunc::new(1, |ctx, args| {
            let (_, object) = ctx.target.ok_or_else(|| ActionError::Failed("no target".into()))?;
            let value = object["value"].as_i64().unwrap_or_default();
            Ok(json!({"value": value, "caller": args[0]["id"].clone()}))
        });
        let action = Action::new("peek", func, vec![Parameter::new("user", ParamKind::User)])
            .unwrap()
            .instance()
            .returns(Parameter::unnamed(ParamKind::Map));

        let mut tx = started(&store);
        let ids = vec!["1".to_string(), "2".to_string()];
        let response = action
            .call(&converter(), &mut tx, COUNTER, &ids, &Value::Null, &User::named("ann"), true)
            .unwrap();
        assert_eq!(
            response.data,
            Some(json!({
                "/api/tools/counter:1:": {"value": 3, "caller": "ann"},
                "/api/tools/counter:2:": {"value": 4, "caller": "ann"}
            }))
        );

        let missing = vec!["9".to_string()];
        let err = action
            .call(&converter(), &mut tx, COUNTER, &missing, &Value::Null, &User::named("ann"), false)
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn action_errors_map_to_statuses() {
        assert_eq!(ProtocolError::from(ActionError::Invalid("x".into())).status(), 400);
        assert_eq!(ProtocolError::from(ActionError::Failed("x".into())).status(), 500);
    }
}
