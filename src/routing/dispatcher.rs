//! The request life cycle: parse, resolve, check, authenticate, execute.

use std::sync::Arc;

use serde_json::Value;

use crate::config::ProtocolConfig;
use crate::protocol::{parse_flag, ProtocolError, Request, Response, Verb, PROTOCOL_VERSION};
use crate::registry::{
    Action, Catalog, ElementRef, Invocation, ListOptions, Model, Namespace, DEFAULT_PAGE_SIZE,
};
use crate::routing::checks::{check_structure, Target};
use crate::security::{cors, Authenticator, User};

/// Runtime knobs of the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// LIST page size when `COUNT` is absent.
    pub default_page_size: usize,
    /// Show store and state error messages to clients.
    pub debug: bool,
    /// Origins for CORS headers; `None` disables them.
    pub cors_allow_list: Option<Vec<String>>,
}

impl DispatchSettings {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            debug: config.debug,
            cors_allow_list: (!config.cors_allow_list.is_empty())
                .then(|| config.cors_allow_list.clone()),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            debug: false,
            cors_allow_list: None,
        }
    }
}

/// Dispatches protocol requests against a [`Catalog`].
pub struct Dispatcher {
    catalog: Catalog,
    authenticator: Arc<dyn Authenticator>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        catalog: Catalog,
        authenticator: Arc<dyn Authenticator>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            catalog,
            authenticator,
            settings,
        }
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Dispatch and render, errors included.
    pub fn handle(&self, request: Request) -> Response {
        let verb = request.verb.clone();
        let uri = request.uri.clone();
        let result = self.dispatch(request);

        if let Err(err) = &result {
            if err.status() >= 500 {
                tracing::error!(verb = %verb, uri = %uri, error = %err, "Request failed");
            } else {
                tracing::debug!(verb = %verb, uri = %uri, error = %err, "Request rejected");
            }
        }

        self.respond(result)
    }

    /// Attach protocol and CORS headers to a result.
    pub fn respond(&self, result: Result<Response, ProtocolError>) -> Response {
        let mut response = result.unwrap_or_else(|err| err.into_response(self.settings.debug));
        response
            .header_map
            .insert("Cinp-Version".into(), PROTOCOL_VERSION.into());
        if let Some(allow_list) = &self.settings.cors_allow_list {
            cors::apply(&mut response, allow_list);
        }
        response
    }

    pub fn dispatch(&self, mut request: Request) -> Result<Response, ProtocolError> {
        let verb: Verb = request.verb.parse().map_err(|_| {
            ProtocolError::bad_request(format!("Invalid Verb (HTTP Method) \"{}\"", request.verb))
        })?;

        let converter = self.catalog.converter();
        let parts = converter
            .uri()
            .split(&request.uri, false)
            .map_err(|_| ProtocolError::bad_request(format!("Unable to Parse \"{}\"", request.uri)))?;

        let multi_uri_max = self.catalog.multi_uri_max();
        if parts.ids().len() > multi_uri_max {
            return Err(ProtocolError::bad_request(format!(
                "id_list longer than supported length of \"{multi_uri_max}\""
            )));
        }

        let element = self
            .catalog
            .lookup(&parts)
            .ok_or_else(|| ProtocolError::NotFound {
                uri: request.uri.clone(),
            })?;

        if verb == Verb::Options {
            let mut response = match element {
                ElementRef::Namespace(_) => Namespace::options(),
                ElementRef::Model(_) => Model::options(),
                ElementRef::Action(..) => Action::options(),
            };
            if self.settings.cors_allow_list.is_some() {
                cors::apply_preflight(&mut response);
            }
            return Ok(response);
        }

        if request.header("CINP-VERSION") != Some(PROTOCOL_VERSION) {
            return Err(ProtocolError::bad_request("Invalid CInP Protocol Version"));
        }

        let target = match element {
            ElementRef::Namespace(_) => Target::Namespace,
            ElementRef::Model(_) => Target::Model,
            ElementRef::Action(..) => Target::Action,
        };
        check_structure(verb, target, parts.id_list.is_some(), &mut request.data)?;

        let blocked = match element {
            ElementRef::Namespace(_) => false,
            ElementRef::Model(model) | ElementRef::Action(model, _) => !model.is_allowed(verb),
        };
        if blocked {
            return Err(ProtocolError::VerbNotAllowed { verb });
        }

        let multi_requested = request.header("MULTI-OBJECT").is_some_and(parse_flag);
        if parts.is_multi() && !multi_requested {
            return Err(ProtocolError::bad_request(
                "requested non multi-object, however multiple ids where sent",
            ));
        }
        let multi = multi_requested && parts.id_list.is_some();

        let user = self
            .authenticator
            .authenticate(request.header("AUTH-ID"), request.header("AUTH-TOKEN"))
            .ok_or(ProtocolError::InvalidSession)?;

        tracing::debug!(verb = %verb, uri = %request.uri, user = ?user.id(), "Dispatching");

        let id_list = parts.ids();
        match element {
            ElementRef::Namespace(namespace) => {
                namespace.authorize(&user)?;
                Ok(namespace.describe(multi_uri_max))
            }
            ElementRef::Model(model) if verb == Verb::Describe => {
                model.authorize(&user, verb, id_list)?;
                Ok(model.describe(converter))
            }
            ElementRef::Action(_, action) if verb == Verb::Describe => {
                let ids = (!id_list.is_empty()).then_some(id_list);
                if !action.check_auth(&user, verb, ids) {
                    return Err(ProtocolError::Authorization);
                }
                Ok(action.describe(converter))
            }
            ElementRef::Model(model) => {
                let list = self.list_options(&request)?;
                let invocation = invocation(verb, &user, id_list, request.data.as_ref(), multi).list(list);
                model.invoke(converter, &invocation)
            }
            ElementRef::Action(model, action) => {
                let invocation = invocation(verb, &user, id_list, request.data.as_ref(), multi);
                model.invoke_action(converter, action.name(), &invocation)
            }
        }
    }

    fn list_options(&self, request: &Request) -> Result<ListOptions, ProtocolError> {
        let parse = |name: &str, default: usize| {
            request
                .header(name)
                .map_or(Ok(default), |value| value.trim().parse::<usize>())
                .map_err(|_| {
                    ProtocolError::bad_request("Count and Position must be integers if specified")
                })
        };

        Ok(ListOptions {
            filter: request.header("FILTER").map(str::to_string),
            position: parse("POSITION", 0)?,
            count: parse("COUNT", self.settings.default_page_size)?,
            id_only: request.header("ID-ONLY").is_some_and(parse_flag),
        })
    }
}

fn invocation<'a>(
    verb: Verb,
    user: &'a User,
    id_list: &'a [String],
    data: Option<&'a Value>,
    multi: bool,
) -> Invocation<'a> {
    let mut invocation = Invocation::new(verb, user).ids(id_list).multi(multi);
    invocation.data = data;
    invocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HeaderMap;
    use crate::registry::{ActionFunc, Field, FieldMode, ParamKind, Parameter, Registry};
    use crate::security::{CheckAuth, StaticAuthenticator};
    use crate::transaction::{MemoryStore, Object};
    use rstest::{fixture, rstest};
    use serde_json::json;

    const BOOK: &str = "/api/library/book";

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for (id, title) in [("1", "Dune"), ("2", "Emma"), ("3", "Persuasion")] {
            let mut object = Object::new();
            object.insert("title".into(), json!(title));
            store.insert(BOOK, id, object);
        }
        store
    }

    #[fixture]
    fn dispatcher() -> Dispatcher {
        let shout = ActionFunc::new(1, |_, args| {
            Ok(json!(args[0].as_str().unwrap_or_default().to_uppercase()))
        });
        let model = Model::new("book", store())
            .unwrap()
            .field(Field::new(Parameter::new("title", ParamKind::String)).mode(FieldMode::ReadWrite))
            .unwrap()
            .not_allowed(Verb::Delete)
            .unwrap()
            .action(
                Action::new("shout", shout, vec![Parameter::new("text", ParamKind::String)])
                    .unwrap()
                    .returns(Parameter::unnamed(ParamKind::String)),
            )
            .unwrap()
            .check_auth(CheckAuth::authenticated());

        let mut registry = Registry::new("/api/", "0.0").unwrap();
        registry
            .register_namespace("/api/", Namespace::new("library", "1.0").unwrap())
            .unwrap();
        registry.register_model("/api/library/", model).unwrap();

        let authenticator = StaticAuthenticator::new().with_user("alice", "secret", false);
        Dispatcher::new(
            registry.build().unwrap(),
            Arc::new(authenticator),
            DispatchSettings::default(),
        )
    }

    fn request(verb: &str, uri: &str) -> Request {
        Request::new(verb, uri, HeaderMap::new()).with_header("CINP-VERSION", PROTOCOL_VERSION)
    }

    fn as_alice(request: Request) -> Request {
        request.with_header("AUTH-ID", "alice").with_header("AUTH-TOKEN", "secret")
    }

    #[rstest]
    fn unknown_verb(dispatcher: Dispatcher) {
        let response = dispatcher.handle(request("PATCHY", "/api/"));
        assert_eq!(response.status, 400);
        assert_eq!(response.data.clone().unwrap()["message"], json!("Invalid Verb (HTTP Method) \"PATCHY\""));
        assert_eq!(response.header("Cinp-Version"), Some(PROTOCOL_VERSION));
    }

    #[rstest]
    fn unparseable_and_missing_paths(dispatcher: Dispatcher) {
        let bad = dispatcher.handle(request("DESCRIBE", "/other/"));
        assert_eq!(bad.status, 400);
        assert_eq!(bad.data.clone().unwrap()["message"], json!("Unable to Parse \"/other/\""));

        let missing = dispatcher.handle(request("DESCRIBE", "/api/nothing/"));
        assert_eq!(missing.status, 404);
        assert_eq!(missing.data.clone().unwrap()["message"], json!("path not found \"/api/nothing/\""));
    }

    #[rstest]
    fn options_skips_version_and_auth(dispatcher: Dispatcher) {
        let request = Request::new("OPTIONS", "/api/library/book", HeaderMap::new());
        let response = dispatcher.handle(request);
        assert_eq!(response.status, 200);
        assert_eq!(
            response.header("Allow"),
            Some("OPTIONS, DESCRIBE, GET, LIST, CREATE, UPDATE, DELETE")
        );
    }

    #[rstest]
    fn version_is_required(dispatcher: Dispatcher) {
        let request = Request::new("DESCRIBE", "/api/", HeaderMap::new());
        let response = dispatcher.handle(request);
        assert_eq!(response.status, 400);
        assert_eq!(response.data.clone().unwrap()["message"], json!("Invalid CInP Protocol Version"));
    }

    #[rstest]
    fn describe_root(dispatcher: Dispatcher) {
        let response = dispatcher.handle(request("DESCRIBE", "/api/"));
        assert_eq!(response.status, 200);
        assert_eq!(
            response.data.clone().unwrap(),
            json!({
                "name": "root",
                "path": "/api/",
                "api-version": "0.0",
                "multi-uri-max": 100,
                "namespaces": ["/api/library/"],
                "models": []
            })
        );
    }

    #[rstest]
    fn several_ids_need_the_multi_header(dispatcher: Dispatcher) {
        let plain = dispatcher.handle(as_alice(request("GET", "/api/library/book:1:2:")));
        assert_eq!(plain.status, 400);

        let multi = dispatcher.handle(
            as_alice(request("GET", "/api/library/book:1:2:")).with_header("MULTI-OBJECT", "true"),
        );
        assert_eq!(multi.status, 200);
        let data = multi.data.clone().unwrap();
        assert_eq!(data["/api/library/book:1:"]["title"], json!("Dune"));
        assert_eq!(multi.header("Multi-Object"), Some("True"));
    }

    #[rstest]
    fn multi_header_with_one_id_returns_a_map(dispatcher: Dispatcher) {
        let response = dispatcher.handle(
            as_alice(request("GET", "/api/library/book:2:")).with_header("MULTI-OBJECT", "True"),
        );
        assert_eq!(response.data.clone().unwrap()["/api/library/book:2:"]["title"], json!("Emma"));
    }

    #[rstest]
    fn id_list_limit(dispatcher: Dispatcher) {
        let ids: Vec<String> = (0..101).map(|i| i.to_string()).collect();
        let uri = format!("/api/library/book:{}:", ids.join(":"));
        let response = dispatcher.handle(as_alice(request("GET", &uri)).with_header("MULTI-OBJECT", "true"));
        assert_eq!(response.status, 400);
    }

    #[rstest]
    fn bad_credentials_are_an_invalid_session(dispatcher: Dispatcher) {
        let response = dispatcher.handle(
            request("LIST", "/api/library/book")
                .with_header("AUTH-ID", "alice")
                .with_header("AUTH-TOKEN", "wrong"),
        );
        assert_eq!(response.status, 401);
        assert_eq!(response.data.clone().unwrap()["message"], json!("Invalid Session"));
    }

    #[rstest]
    fn anonymous_is_not_authorized(dispatcher: Dispatcher) {
        let response = dispatcher.handle(request("LIST", "/api/library/book"));
        assert_eq!(response.status, 403);
    }

    #[rstest]
    fn blocked_verb_is_rejected_before_auth(dispatcher: Dispatcher) {
        let response = dispatcher.handle(request("DELETE", "/api/library/book:1:"));
        assert_eq!(response.status, 403);
        assert_eq!(response.data.clone().unwrap()["kind"], json!("VerbNotAllowed"));
    }

    fn locked_down() -> Dispatcher {
        let shout = ActionFunc::new(1, |_, args| Ok(args[0].clone()));
        let mut model = Model::new("book", store())
            .unwrap()
            .field(Field::new(Parameter::new("title", ParamKind::String)).mode(FieldMode::ReadWrite))
            .unwrap()
            .action(Action::new("shout", shout, vec![Parameter::new("text", ParamKind::String)]).unwrap())
            .unwrap()
            .check_auth(CheckAuth::permit());
        for verb in [Verb::Get, Verb::List, Verb::Create, Verb::Update, Verb::Delete, Verb::Call] {
            model = model.not_allowed(verb).unwrap();
        }

        let mut registry = Registry::new("/api/", "0.0").unwrap();
        registry
            .register_namespace("/api/", Namespace::new("library", "1.0").unwrap())
            .unwrap();
        registry.register_model("/api/library/", model).unwrap();
        Dispatcher::new(
            registry.build().unwrap(),
            Arc::new(StaticAuthenticator::new().with_user("alice", "secret", false)),
            DispatchSettings::default(),
        )
    }

    #[rstest]
    #[case::get("GET", "/api/library/book:1:", None)]
    #[case::get_several_ids("GET", "/api/library/book:1:2:", None)]
    #[case::list("LIST", "/api/library/book", None)]
    #[case::list_with_data("LIST", "/api/library/book", Some(json!({})))]
    #[case::create("CREATE", "/api/library/book", Some(json!({"title": "Emma"})))]
    #[case::update("UPDATE", "/api/library/book:1:", Some(json!({"title": "Emma"})))]
    #[case::delete("DELETE", "/api/library/book:1:", None)]
    #[case::static_call("CALL", "/api/library/book(shout)", Some(json!({"text": "hi"})))]
    #[case::static_call_without_data("CALL", "/api/library/book(shout)", None)]
    #[case::call_with_ids("CALL", "/api/library/book:1:(shout)", Some(json!({"text": "hi"})))]
    fn every_blocked_verb_is_rejected(#[case] verb: &str, #[case] uri: &str, #[case] data: Option<Value>) {
        let dispatcher = locked_down();
        let mut blocked = as_alice(request(verb, uri));
        if let Some(data) = data {
            blocked = blocked.with_data(data);
        }

        let response = dispatcher.handle(blocked);
        assert_eq!(response.status, 403, "{verb} {uri}");
        assert_eq!(response.data.clone().unwrap()["kind"], json!("VerbNotAllowed"));

        let describe = dispatcher.handle(as_alice(request("DESCRIBE", "/api/library/book")));
        assert_eq!(describe.status, 200);
    }

    #[rstest]
    fn list_paging_headers(dispatcher: Dispatcher) {
        let response = dispatcher.handle(
            as_alice(request("LIST", "/api/library/book"))
                .with_header("POSITION", "1")
                .with_header("COUNT", "1"),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Position"), Some("1"));
        assert_eq!(response.header("Total"), Some("3"));
        assert_eq!(response.data.clone().unwrap(), json!(["/api/library/book:2:"]));

        let bad = dispatcher.handle(as_alice(request("LIST", "/api/library/book")).with_header("COUNT", "ten"));
        assert_eq!(
            bad.data.clone().unwrap()["message"],
            json!("Count and Position must be integers if specified")
        );
    }

    #[rstest]
    fn calls_static_action(dispatcher: Dispatcher) {
        let response = dispatcher.handle(
            as_alice(request("CALL", "/api/library/book(shout)")).with_data(json!({"text": "hi"})),
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.data.clone().unwrap(), json!("HI"));
        assert_eq!(response.header("Verb"), Some("CALL"));
    }

    #[rstest]
    fn cors_headers_when_configured(mut dispatcher: Dispatcher) {
        dispatcher.settings.cors_allow_list = Some(vec!["https://ui.example".into()]);

        let options = dispatcher.handle(Request::new("OPTIONS", "/api/", HeaderMap::new()));
        assert_eq!(options.header("Access-Control-Allow-Methods"), Some("OPTIONS, DESCRIBE"));
        assert_eq!(options.header("Access-Control-Allow-Origin"), Some("https://ui.example"));

        let error = dispatcher.handle(request("DESCRIBE", "/api/nothing/"));
        assert!(error.header("Access-Control-Expose-Headers").is_some());
    }
}
