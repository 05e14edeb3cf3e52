//! Protocol verbs and their structural rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A verb carried by every protocol request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Describe,
    Get,
    List,
    Create,
    Update,
    Delete,
    Call,
    Options,
}

/// Returned when a token is not one of the protocol verbs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown verb \"{0}\"")]
pub struct UnknownVerb(pub String);

impl Verb {
    pub const ALL: [Verb; 8] = [
        Verb::Describe,
        Verb::Get,
        Verb::List,
        Verb::Create,
        Verb::Update,
        Verb::Delete,
        Verb::Call,
        Verb::Options,
    ];

    /// Wire spelling of the verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Verb::Describe => "DESCRIBE",
            Verb::Get => "GET",
            Verb::List => "LIST",
            Verb::Create => "CREATE",
            Verb::Update => "UPDATE",
            Verb::Delete => "DELETE",
            Verb::Call => "CALL",
            Verb::Options => "OPTIONS",
        }
    }

    /// Verbs that may address specific objects by id.
    #[must_use]
    pub const fn accepts_ids(self) -> bool {
        matches!(self, Verb::Get | Verb::Update | Verb::Delete | Verb::Call)
    }

    /// Verbs that cannot run without an id.
    #[must_use]
    pub const fn requires_ids(self) -> bool {
        matches!(self, Verb::Get | Verb::Update | Verb::Delete)
    }

    /// Verbs that may carry a request body.
    #[must_use]
    pub const fn accepts_data(self) -> bool {
        matches!(self, Verb::List | Verb::Update | Verb::Create | Verb::Call)
    }

    /// Verbs that cannot run without a request body.
    #[must_use]
    pub const fn requires_data(self) -> bool {
        matches!(self, Verb::Update | Verb::Create)
    }

    /// Verbs that only make sense against a model.
    #[must_use]
    pub const fn requires_model(self) -> bool {
        matches!(
            self,
            Verb::Get | Verb::List | Verb::Create | Verb::Update | Verb::Delete
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| UnknownVerb(s.to_string()))
    }
}
