//! URI grammar for addressing namespaces, models, actions and objects.
//!
//! # Grammar
//! ```text
//! <root>[<ns>/...][<model>[(<action>)][:<id>[:<id>...]:]]
//! ```
//! Ids may also precede the action (`<model>:<id>:(<action>)`).
//!
//! # Design Decisions
//! - Hand-written scanner over `&str`; names are restricted to an
//!   unreserved character set so no escaping is needed
//! - `build` always emits the action before the ids
//! - Empty ids (`model::`) are rejected

use thiserror::Error;

/// URI parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    /// The configured root path is not `/`-delimited.
    #[error("root path \"{0}\" must start and end with \"/\"")]
    InvalidRoot(String),

    /// The URI does not follow the grammar.
    #[error("unable to parse \"{0}\"")]
    Unparseable(String),
}

/// The parts of a split URI.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UriParts {
    /// Namespace names below the root, outermost first.
    pub namespace: Vec<String>,
    pub model: Option<String>,
    pub action: Option<String>,
    /// `None` when the URI carries no id segment.
    pub id_list: Option<Vec<String>>,
}

impl UriParts {
    /// True when the URI addresses more than one object.
    #[must_use]
    pub fn is_multi(&self) -> bool {
        self.id_list.as_ref().is_some_and(|ids| ids.len() > 1)
    }

    /// Ids as a slice, empty when the URI carries none.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        self.id_list.as_deref().unwrap_or(&[])
    }
}

/// Splits and builds URIs below a fixed root path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    root_path: String,
}

impl Uri {
    /// Create a URI codec rooted at `root_path` (for example `/api/`).
    pub fn new(root_path: impl Into<String>) -> Result<Self, UriError> {
        let root_path = root_path.into();
        if !root_path.starts_with('/') || !root_path.ends_with('/') {
            return Err(UriError::InvalidRoot(root_path));
        }
        if root_path.len() > 1 && !root_path[1..root_path.len() - 1].split('/').all(is_name) {
            return Err(UriError::InvalidRoot(root_path));
        }

        Ok(Self { root_path })
    }

    #[must_use]
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Split `uri` into its parts.
    ///
    /// With `root_optional` a URI that starts at `/` instead of the root
    /// path is accepted as well.
    pub fn split(&self, uri: &str, root_optional: bool) -> Result<UriParts, UriError> {
        let unparseable = || UriError::Unparseable(uri.to_string());

        let rest = match uri.strip_prefix(self.root_path.as_str()) {
            Some(rest) => rest,
            None if root_optional => uri.strip_prefix('/').ok_or_else(unparseable)?,
            None => return Err(unparseable()),
        };

        let mut segments: Vec<&str> = rest.split('/').collect();
        let tail = segments.pop().unwrap_or_default();
        if !segments.iter().all(|segment| is_name(segment)) {
            return Err(unparseable());
        }

        let mut parts = UriParts {
            namespace: segments.into_iter().map(str::to_string).collect(),
            ..UriParts::default()
        };
        if tail.is_empty() {
            return Ok(parts);
        }

        let model_end = tail.find(|c: char| c == ':' || c == '(').unwrap_or(tail.len());
        let (model, mut rest) = tail.split_at(model_end);
        if !is_name(model) {
            return Err(unparseable());
        }
        parts.model = Some(model.to_string());

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('(') {
                let close = after.find(')').ok_or_else(unparseable)?;
                let action = &after[..close];
                if parts.action.is_some() || !is_name(action) {
                    return Err(unparseable());
                }
                parts.action = Some(action.to_string());
                rest = &after[close + 1..];
            } else if let Some(after) = rest.strip_prefix(':') {
                let end = after.find('(').unwrap_or(after.len());
                let ids = after[..end].strip_suffix(':').ok_or_else(unparseable)?;
                if parts.id_list.is_some() || !ids.split(':').all(is_id) {
                    return Err(unparseable());
                }
                parts.id_list = Some(ids.split(':').map(str::to_string).collect());
                rest = &after[end..];
            } else {
                return Err(unparseable());
            }
        }

        Ok(parts)
    }

    /// Build a URI from its parts.
    #[must_use]
    pub fn build(
        &self,
        namespace: &[String],
        model: Option<&str>,
        action: Option<&str>,
        id_list: Option<&[String]>,
    ) -> String {
        let mut uri = self.root_path.clone();
        for name in namespace {
            uri.push_str(name);
            uri.push('/');
        }

        let Some(model) = model else {
            return uri;
        };
        uri.push_str(model);

        if let Some(action) = action {
            uri.push('(');
            uri.push_str(action);
            uri.push(')');
        }

        if let Some(ids) = id_list.filter(|ids| !ids.is_empty()) {
            uri.push(':');
            for id in ids {
                uri.push_str(id);
                uri.push(':');
            }
        }

        uri
    }

    /// Build the URI of a namespace or model from `parts`, ignoring action and ids.
    #[must_use]
    pub fn element_path(&self, parts: &UriParts) -> String {
        self.build(&parts.namespace, parts.model.as_deref(), None, None)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '!' | '~' | '*')
}

/// True when `value` is a usable namespace, model or action name.
pub(crate) fn is_name(value: &str) -> bool {
    !value.is_empty() && value.chars().all(is_name_char)
}

fn is_id(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| is_name_char(c) || matches!(c, '\'' | ' '))
}
