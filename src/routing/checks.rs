//! Structural request checks run before authentication.

use serde_json::{Map, Value};

use crate::protocol::{ProtocolError, Verb};

/// The kind of element a URI resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Namespace,
    Model,
    Action,
}

/// Check that `verb` fits the addressed element, ids and body. LIST and
/// CALL without a body get an empty map.
pub fn check_structure(
    verb: Verb,
    target: Target,
    has_ids: bool,
    data: &mut Option<Value>,
) -> Result<(), ProtocolError> {
    if target == Target::Action && !matches!(verb, Verb::Call | Verb::Describe) {
        return Err(ProtocolError::bad_request(format!(
            "Invalid verb \"{verb}\" for request with action"
        )));
    }

    if verb == Verb::Call && target != Target::Action {
        return Err(ProtocolError::bad_request(format!(
            "Verb \"{verb}\" requires action"
        )));
    }

    if has_ids && !verb.accepts_ids() {
        return Err(ProtocolError::bad_request(format!(
            "Invalid Verb \"{verb}\" for request with id"
        )));
    }

    if !has_ids && verb.requires_ids() {
        return Err(ProtocolError::bad_request(format!("Verb \"{verb}\" requires id")));
    }

    if data.is_some() && !verb.accepts_data() {
        return Err(ProtocolError::bad_request(format!(
            "Invalid verb \"{verb}\" for request with data"
        )));
    }

    if data.is_none() {
        if verb.requires_data() {
            return Err(ProtocolError::bad_request(format!("Verb \"{verb}\" requires data")));
        }
        if matches!(verb, Verb::List | Verb::Call) {
            *data = Some(Value::Object(Map::new()));
        }
    }

    if verb.requires_model() && target != Target::Model {
        return Err(ProtocolError::bad_request(format!(
            "Verb \"{verb}\" requires model"
        )));
    }

    Ok(())
}
