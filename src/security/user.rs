//! Request identities and the authentication hook.
//!
//! # Responsibilities
//! - Represent the caller of a request (anonymous, named or superuser)
//! - Resolve `AUTH-ID`/`AUTH-TOKEN` headers into a [`User`]
//!
//! # Design Decisions
//! - No credentials at all means anonymous, never an error
//! - Partial or wrong credentials resolve to no user (401 upstream)
//! - Token comparison does not short-circuit on the first differing byte

use std::collections::HashMap;

use serde::Serialize;

use crate::config::AuthConfig;

/// The caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    id: Option<String>,
    superuser: bool,
}

impl User {
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            id: None,
            superuser: false,
        }
    }

    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            superuser: false,
        }
    }

    /// A user that bypasses every auth predicate.
    pub fn superuser(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            superuser: true,
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    #[must_use]
    pub const fn is_superuser(&self) -> bool {
        self.superuser
    }
}

/// Resolves request credentials into a user.
pub trait Authenticator: Send + Sync {
    /// `None` means the credentials are not valid.
    fn authenticate(&self, auth_id: Option<&str>, auth_token: Option<&str>) -> Option<User>;
}

/// Accepts only requests without credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousAuthenticator;

impl Authenticator for AnonymousAuthenticator {
    fn authenticate(&self, auth_id: Option<&str>, auth_token: Option<&str>) -> Option<User> {
        match (auth_id, auth_token) {
            (None, None) => Some(User::anonymous()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Credential {
    token: String,
    superuser: bool,
}

/// Authenticates against a fixed id/token table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    credentials: HashMap<String, Credential>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the `[auth]` config section.
    pub fn from_config(config: &AuthConfig) -> Self {
        config
            .users
            .iter()
            .fold(Self::new(), |auth, user| {
                auth.with_user(&user.id, &user.token, user.superuser)
            })
    }

    #[must_use]
    pub fn with_user(mut self, id: &str, token: &str, superuser: bool) -> Self {
        self.credentials.insert(
            id.to_string(),
            Credential {
                token: token.to_string(),
                superuser,
            },
        );
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, auth_id: Option<&str>, auth_token: Option<&str>) -> Option<User> {
        let (auth_id, auth_token) = match (auth_id, auth_token) {
            (None, None) => return Some(User::anonymous()),
            (Some(id), Some(token)) => (id, token),
            _ => return None,
        };

        let credential = self.credentials.get(auth_id)?;
        if !tokens_match(&credential.token, auth_token) {
            tracing::debug!(auth_id = %auth_id, "Rejected credentials");
            return None;
        }

        Some(User {
            id: Some(auth_id.to_string()),
            superuser: credential.superuser,
        })
    }
}

fn tokens_match(expected: &str, given: &str) -> bool {
    let (expected, given) = (expected.as_bytes(), given.as_bytes());
    expected.len() == given.len()
        && expected
            .iter()
            .zip(given)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
