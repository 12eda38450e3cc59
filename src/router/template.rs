//! URI template compiler.
//!
//! Turns a raw template such as `/orders/{id}/items/{item:\d+}` into a
//! [`UriTemplate`]: the normalized template text, the regex used for matching,
//! the number of literal characters and the ordered parameter names.
//!
//! Grammar: `{` name `}` or `{` name `:` regex `}` where name matches
//! `[A-Za-z0-9_.-]+`. Spaces around the name, the `:` and the regex are
//! ignored. An absent or empty regex defaults to [`DEFAULT_PARAM_REGEX`].
//!
//! Every compiled regex ends with the optional remainder group
//! [`REMAINDER_REGEX`], which captures whatever follows the template so that
//! sub-resources can continue matching against it.

use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use crate::error::TemplateError;

/// Regex substituted for `{name}` and `{name:}`: one or more non-slash characters.
pub const DEFAULT_PARAM_REGEX: &str = "[^/]+?";

/// Trailing group appended to every template, never counted as a parameter.
pub const REMAINDER_REGEX: &str = "(/.*)?";

/// Characters percent-encoded in literal path text. `%` is handled separately
/// so that existing escapes are not encoded twice.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A compiled, immutable URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    template: String,
    regex: String,
    literal_chars: usize,
    param_names: Vec<Arc<str>>,
    group_indexes: Option<Vec<usize>>,
}

impl UriTemplate {
    /// Normalized template text, e.g. `/a/{x}/{y:.*}`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Matching regex without anchors, remainder group included.
    #[must_use]
    pub fn regex(&self) -> &str {
        &self.regex
    }

    /// Number of literal (non-parameter) characters in the normalized,
    /// percent-encoded template.
    #[must_use]
    pub fn literal_chars(&self) -> usize {
        self.literal_chars
    }

    /// Parameter names in declaration order.
    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    /// Capturing group of each parameter followed by the remainder group.
    ///
    /// `None` when groups are contiguous `1..=N+1`, which is the case unless a
    /// parameter regex introduces groups of its own.
    #[must_use]
    pub fn group_indexes(&self) -> Option<&[usize]> {
        self.group_indexes.as_deref()
    }

    /// Group index for parameter `i`, or the remainder when `i == len(params)`.
    #[must_use]
    pub fn group_index(&self, i: usize) -> usize {
        match &self.group_indexes {
            Some(indexes) => indexes[i],
            None => i + 1,
        }
    }
}

impl std::fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.template)
    }
}

/// Compile a raw URI template.
///
/// # Errors
///
/// Returns [`TemplateError`] when a parameter name contains an illegal
/// character, a name repeats, braces are unbalanced or a parameter regex does
/// not compile.
pub fn compile(raw: &str) -> Result<UriTemplate, TemplateError> {
    let source = normalize(raw);
    let mut compiler = Compiler::new(raw);

    let mut rest = source.as_str();
    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err(TemplateError::UnbalancedBraces {
                template: raw.to_string(),
            });
        }
        compiler.literal(&rest[..open]);
        let close = matching_brace(&rest[open..]).ok_or_else(|| TemplateError::UnbalancedBraces {
            template: raw.to_string(),
        })?;
        compiler.parameter(&rest[open + 1..open + close])?;
        rest = &rest[open + close + 1..];
    }
    compiler.literal(rest);

    Ok(compiler.finish(source.is_empty()))
}

/// Add the leading slash and drop a single trailing slash. The root template
/// normalizes to the empty string.
fn normalize(raw: &str) -> String {
    let mut s = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    };
    if s.ends_with('/') {
        s.pop();
    }
    s
}

/// Offset of the `}` closing the `{` at offset 0, honouring nested braces
/// inside parameter regexes such as `\d{2,4}`.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in s.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

struct Compiler<'a> {
    raw: &'a str,
    regex: String,
    template: String,
    literal_chars: usize,
    names: Vec<Arc<str>>,
    groups_per_param: Vec<usize>,
}

impl<'a> Compiler<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            regex: String::with_capacity(raw.len() + REMAINDER_REGEX.len()),
            template: String::with_capacity(raw.len()),
            literal_chars: 0,
            names: Vec::new(),
            groups_per_param: Vec::new(),
        }
    }

    fn literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let encoded = encode_literal(text);
        self.literal_chars += encoded.chars().count();
        self.regex.push_str(&regex::escape(&encoded));
        self.template.push_str(&encoded);
    }

    fn parameter(&mut self, body: &str) -> Result<(), TemplateError> {
        let mut name = String::new();
        let mut expr = "";
        for (i, ch) in body.char_indices() {
            match ch {
                ' ' => continue,
                c if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' => name.push(c),
                ':' => {
                    expr = body[i + 1..].trim();
                    break;
                }
                other => {
                    return Err(TemplateError::IllegalCharacter {
                        template: self.raw.to_string(),
                        segment: body.to_string(),
                        found: other,
                    })
                }
            }
        }
        if name.is_empty() {
            return Err(TemplateError::EmptyName {
                template: self.raw.to_string(),
            });
        }
        if self.names.iter().any(|n| n.as_ref() == name) {
            return Err(TemplateError::DuplicateName {
                template: self.raw.to_string(),
                name,
            });
        }

        let expr = if expr.is_empty() {
            self.template.push_str(&format!("{{{name}}}"));
            DEFAULT_PARAM_REGEX
        } else {
            self.template.push_str(&format!("{{{name}:{expr}}}"));
            expr
        };

        let nested = Regex::new(expr)
            .map_err(|e| TemplateError::InvalidRegex {
                template: self.raw.to_string(),
                name: name.clone(),
                reason: e.to_string(),
            })?
            .captures_len()
            - 1;
        self.groups_per_param.push(nested + 1);

        self.regex.push('(');
        self.regex.push_str(expr);
        self.regex.push(')');
        self.names.push(Arc::from(name));
        Ok(())
    }

    fn finish(mut self, root: bool) -> UriTemplate {
        self.regex.push_str(REMAINDER_REGEX);
        if root {
            // The root slash is not counted, so `/` ranks below every other template.
            self.template.push('/');
        }

        let group_indexes = if self.groups_per_param.iter().all(|g| *g == 1) {
            None
        } else {
            let mut indexes = Vec::with_capacity(self.groups_per_param.len() + 1);
            let mut next = 1;
            indexes.push(next);
            for groups in &self.groups_per_param {
                next += groups;
                indexes.push(next);
            }
            Some(indexes)
        };

        UriTemplate {
            template: self.template,
            regex: self.regex,
            literal_chars: self.literal_chars,
            param_names: self.names,
            group_indexes,
        }
    }
}

/// Percent-encode literal path text, leaving valid `%XX` escapes untouched.
pub(crate) fn encode_literal(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut chunk_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.extend(utf8_percent_encode(&text[chunk_start..i], PATH_ENCODE_SET));
            out.push_str(&text[i..i + 3]);
            i += 3;
            chunk_start = i;
        } else {
            i += 1;
        }
    }
    out.extend(utf8_percent_encode(&text[chunk_start..], PATH_ENCODE_SET));
    out
}
