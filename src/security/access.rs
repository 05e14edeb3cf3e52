//! Authorization predicates for namespaces, models and actions.
//!
//! A [`CheckAuth`] decides whether a user may apply a verb to an element.
//! Actions share their model's predicate; an [`ActionAuth`] closes over the
//! action name so every check has the same `(user, verb, ids)` shape.

use std::fmt;
use std::sync::Arc;

use crate::protocol::Verb;
use crate::security::user::User;

/// What is being attempted.
#[derive(Debug, Clone, Copy)]
pub struct AuthContext<'a> {
    pub verb: Verb,
    /// Addressed ids, `None` when the URI carries none.
    pub id_list: Option<&'a [String]>,
    /// Action name when the request targets an action.
    pub action: Option<&'a str>,
}

type Predicate = dyn Fn(&User, &AuthContext<'_>) -> bool + Send + Sync;

/// Authorization predicate. Superusers are let through by the caller before
/// the predicate runs.
#[derive(Clone)]
pub struct CheckAuth(Arc<Predicate>);

impl CheckAuth {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&User, &AuthContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Allow everything.
    pub fn permit() -> Self {
        Self::new(|_, _| true)
    }

    /// Allow nothing.
    pub fn deny() -> Self {
        Self::new(|_, _| false)
    }

    /// Allow any authenticated user.
    pub fn authenticated() -> Self {
        Self::new(|user, _| !user.is_anonymous())
    }

    #[must_use]
    pub fn check(&self, user: &User, verb: Verb, id_list: Option<&[String]>) -> bool {
        user.is_superuser()
            || (self.0)(
                user,
                &AuthContext {
                    verb,
                    id_list,
                    action: None,
                },
            )
    }

    /// Bind this predicate to one action.
    pub fn bind_action(&self, action_name: impl Into<String>) -> ActionAuth {
        ActionAuth {
            predicate: self.clone(),
            action_name: action_name.into(),
        }
    }
}

impl fmt::Debug for CheckAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CheckAuth(..)")
    }
}

/// A model predicate closed over an action name.
#[derive(Debug, Clone)]
pub struct ActionAuth {
    predicate: CheckAuth,
    action_name: String,
}

impl ActionAuth {
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    #[must_use]
    pub fn check(&self, user: &User, verb: Verb, id_list: Option<&[String]>) -> bool {
        user.is_superuser()
            || (self.predicate.0)(
                user,
                &AuthContext {
                    verb,
                    id_list,
                    action: Some(&self.action_name),
                },
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_bypasses_deny() {
        let deny = CheckAuth::deny();
        assert!(!deny.check(&User::named("bob"), Verb::Get, None));
        assert!(deny.check(&User::superuser("root"), Verb::Get, None));
    }

    #[test]
    fn authenticated_rejects_anonymous() {
        let check = CheckAuth::authenticated();
        assert!(!check.check(&User::anonymous(), Verb::List, None));
        assert!(check.check(&User::named("bob"), Verb::List, None));
    }

    #[test]
    fn action_binding_passes_action_name() {
        let check = CheckAuth::new(|_, ctx| match ctx.action {
            Some(name) => name == "lend",
            None => ctx.verb == Verb::Describe,
        });
        let user = User::named("bob");
        let ids = vec!["1".to_string()];

        assert!(check.bind_action("lend").check(&user, Verb::Call, Some(&ids)));
        assert!(!check.bind_action("burn").check(&user, Verb::Call, Some(&ids)));
        assert!(check.check(&user, Verb::Describe, None));
        assert!(!check.check(&user, Verb::Get, Some(&ids)));
        assert_eq!(check.bind_action("lend").action_name(), "lend");
    }
}
