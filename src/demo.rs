//! A small library catalog served by the `cinp-server` binary and used by
//! the integration tests.
//!
//! ```text
//! /api/                      root
//! /api/library/              namespace
//! /api/library/author        model
//! /api/library/book          model, filter "author"
//! /api/library/book(count)   static action
//! /api/library/book(checkout) instance action taking the caller
//! ```

use serde_json::{json, Value};

use crate::config::ProtocolConfig;
use crate::protocol::Verb;
use crate::registry::{
    Action, ActionError, ActionFunc, Catalog, Field, FieldMode, Model, Namespace, ParamKind,
    Parameter, Registry, RegistryError,
};
use crate::security::CheckAuth;
use crate::transaction::{ListQuery, MemoryStore, Object};

/// Reads are public, writes and calls need a signed-in user.
fn library_auth() -> CheckAuth {
    CheckAuth::new(|user, ctx| {
        matches!(ctx.verb, Verb::Describe | Verb::Get | Verb::List) || !user.is_anonymous()
    })
}

fn author_model(store: &MemoryStore) -> Result<Model, RegistryError> {
    Ok(Model::new("author", store.clone())?
        .doc("A person who wrote books")
        .field(Field::new(Parameter::new("name", ParamKind::String).length(100)))?
        .field(Field::new(Parameter::new("born", ParamKind::DateTime)).optional())?
        .check_auth(library_auth()))
}

fn book_model(store: &MemoryStore, author_path: &str) -> Result<Model, RegistryError> {
    let count = ActionFunc::new(0, |ctx, _| {
        let page = ctx.transaction.list(ctx.model_path, &ListQuery::default())?;
        Ok(json!(page.total))
    });

    let checkout = ActionFunc::new(1, |ctx, args| {
        let (object_id, book) = ctx
            .target
            .ok_or_else(|| ActionError::Invalid("checkout needs a book".into()))?;
        if book.get("available") == Some(&Value::Bool(false)) {
            return Err(ActionError::Invalid(format!("book {object_id} is already checked out")));
        }
        let borrower = args[0]["id"].as_str().unwrap_or("anonymous").to_string();

        let mut values = Object::new();
        values.insert("available".into(), Value::Bool(false));
        ctx.transaction.update(ctx.model_path, object_id, values)?;
        Ok(json!(format!("checked out by {borrower}")))
    });

    Model::new("book", store.clone())?
        .doc("A book in the catalog")
        .field(Field::new(Parameter::new("title", ParamKind::String).length(200)))?
        .field(Field::new(
            Parameter::new("author", ParamKind::Model).model(author_path),
        ))?
        .field(
            Field::new(Parameter::new("isbn", ParamKind::String).length(17))
                .mode(FieldMode::ReadCreate)
                .optional(),
        )?
        .field(Field::new(
            Parameter::new("available", ParamKind::Boolean).default_value(Value::Bool(true)),
        ))?
        .field(Field::new(Parameter::new("tags", ParamKind::String).array()).optional())?
        .list_filter(
            "author",
            vec![Parameter::new("author", ParamKind::Model).model(author_path)],
        )?
        .constant_set("formats", vec![json!("hardcover"), json!("paperback"), json!("ebook")])
        .action(
            Action::new("count", count, vec![])?
                .doc("Number of books in the catalog")
                .returns(Parameter::unnamed(ParamKind::Integer)),
        )?
        .action(
            Action::new("checkout", checkout, vec![Parameter::new("borrower", ParamKind::User)])?
                .doc("Mark a book as lent out")
                .instance()
                .returns(Parameter::unnamed(ParamKind::String)),
        )
        .map(|model| model.check_auth(library_auth()))
}

/// Register the library catalog on top of `store`.
pub fn build_catalog(config: &ProtocolConfig, store: &MemoryStore) -> Result<Catalog, RegistryError> {
    let namespace_path = format!("{}library/", config.root_path);
    let author_path = format!("{namespace_path}author");
    let book_path = format!("{namespace_path}book");

    store.register_filter(&book_path, "author", |book, values| {
        book.get("author") == values.get("author")
    });

    let mut registry = Registry::new(&config.root_path, &config.root_version)?
        .multi_uri_max(config.multi_uri_max);
    registry.register_namespace(
        &config.root_path,
        Namespace::new("library", "1.0")?.doc("Books and their authors"),
    )?;
    registry.register_model(&namespace_path, author_model(store)?)?;
    registry.register_model(&namespace_path, book_model(store, &author_path)?)?;
    registry.build()
}
