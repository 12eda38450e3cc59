//! Path matching against compiled templates and the precedence order used to
//! choose between competing templates.

use std::cmp::Ordering;
use std::sync::Arc;

use regex::Regex;
use smallvec::SmallVec;

use super::template::{self, UriTemplate};
use crate::error::TemplateError;

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage. Names are shared with the compiled
/// template, values are per-request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Result of matching a path against a [`PathMatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Named captures in template declaration order.
    pub params: ParamVec,
    /// Unmatched trailing path. `None` when the template consumed the whole
    /// path, `Some("/")` when only a trailing slash was left.
    pub remainder: Option<String>,
}

impl PathMatch {
    /// Number of captured values, remainder included. Always `params + 1`.
    #[must_use]
    pub fn capture_count(&self) -> usize {
        self.params.len() + 1
    }

    /// True when nothing but an optional trailing slash is left.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self.remainder.as_deref(), None | Some("/"))
    }

    /// Captured values followed by the remainder.
    #[must_use]
    pub fn captures(&self) -> Vec<Option<&str>> {
        self.params
            .iter()
            .map(|(_, v)| Some(v.as_str()))
            .chain(std::iter::once(self.remainder.as_deref()))
            .collect()
    }

    /// Remaining path to match against children, empty when there is none.
    #[must_use]
    pub fn tail(&self) -> &str {
        self.remainder.as_deref().unwrap_or("")
    }
}

/// A compiled template together with its anchored regex.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: UriTemplate,
    regex: Regex,
}

impl PathMatcher {
    /// Compile `template` into a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when the template is malformed.
    pub fn new(template: &str) -> Result<Self, TemplateError> {
        let template = template::compile(template)?;
        let anchored = format!("^{}$", template.regex());
        let regex = Regex::new(&anchored).map_err(|e| TemplateError::InvalidRegex {
            template: template.as_str().to_string(),
            name: String::new(),
            reason: e.to_string(),
        })?;
        Ok(Self { template, regex })
    }

    #[must_use]
    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    /// Normalized template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.template.as_str()
    }

    /// Match `path`, returning the named captures and the remainder.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let caps = self.regex.captures(path)?;
        let names = self.template.param_names();
        let mut params = ParamVec::new();
        for (i, name) in names.iter().enumerate() {
            let value = caps
                .get(self.template.group_index(i))
                .map(|m| m.as_str())
                .unwrap_or_default();
            params.push((Arc::clone(name), value.to_string()));
        }
        let remainder = caps
            .get(self.template.group_index(names.len()))
            .map(|m| m.as_str().to_string());
        Some(PathMatch { params, remainder })
    }

    /// Compare the first three precedence keys only. `Equal` means the two
    /// templates cannot be ordered by specificity.
    ///
    /// The regex key is descending so that a literal segment sorts ahead of a
    /// capture group at the first position where two templates diverge.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Ordering {
        other
            .template
            .literal_chars()
            .cmp(&self.template.literal_chars())
            .then_with(|| {
                self.template
                    .param_names()
                    .len()
                    .cmp(&other.template.param_names().len())
            })
            .then_with(|| other.template.regex().cmp(self.template.regex()))
    }

    /// True when the two matchers tie on every precedence key.
    #[must_use]
    pub fn ties_with(&self, other: &Self) -> bool {
        self.precedence(other) == Ordering::Equal
    }
}

impl PartialEq for PathMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template
    }
}

impl Eq for PathMatcher {}

impl PartialOrd for PathMatcher {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Most specific first: more literal characters, then fewer parameters, then
/// regex text in descending lexical order. The normalized template text keeps
/// the order total for templates that only differ in parameter names.
impl Ord for PathMatcher {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence(other)
            .then_with(|| self.template.as_str().cmp(other.template.as_str()))
    }
}
