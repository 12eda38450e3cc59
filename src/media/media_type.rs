use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Wildcard used for type and subtype.
pub const WILDCARD: &str = "*";

/// A media type such as `application/json`, `text/*` or `*/*`, optionally
/// carrying a quality value when it comes from an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    kind: String,
    subtype: String,
    params: Vec<(String, String)>,
    quality: f32,
}

/// A media type string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaTypeError {
    #[error("media type '{0}' is missing a subtype")]
    MissingSubtype(String),
    #[error("media type '{0}' has a wildcard type with a concrete subtype")]
    WildcardType(String),
    #[error("media type '{0}' has an empty type or subtype")]
    Empty(String),
    #[error("media type '{0}' has an invalid quality value")]
    InvalidQuality(String),
}

impl MediaType {
    /// Concrete or wildcard media type with quality 1.0.
    #[must_use]
    pub fn new(kind: &str, subtype: &str) -> Self {
        Self {
            kind: kind.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: Vec::new(),
            quality: 1.0,
        }
    }

    /// `*/*`
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// `application/octet-stream`, used when negotiation ends on a wildcard.
    #[must_use]
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Quality value in `[0, 1]`, 1.0 unless a `q` parameter was given.
    #[must_use]
    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Parameters other than `q`, in declaration order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    #[must_use]
    pub fn is_wildcard_type(&self) -> bool {
        self.kind == WILDCARD
    }

    #[must_use]
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD
    }

    /// 2 when type and subtype are concrete, 1 for `type/*`, 0 for `*/*`.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        match (self.is_wildcard_type(), self.is_wildcard_subtype()) {
            (false, false) => 2,
            (false, true) => 1,
            _ => 0,
        }
    }

    /// Types are compatible when type and subtype are each equal or either
    /// side is a wildcard. Parameters and quality are ignored.
    #[must_use]
    pub fn is_compatible(&self, other: &MediaType) -> bool {
        let kind = self.is_wildcard_type() || other.is_wildcard_type() || self.kind == other.kind;
        let subtype = self.is_wildcard_subtype()
            || other.is_wildcard_subtype()
            || self.subtype == other.subtype;
        kind && subtype
    }

    /// `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    /// Copy without quality and parameters.
    #[must_use]
    pub fn without_params(&self) -> MediaType {
        MediaType::new(&self.kind, &self.subtype)
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (kind, subtype) = if essence == WILDCARD {
            (WILDCARD, WILDCARD)
        } else {
            essence
                .split_once('/')
                .ok_or_else(|| MediaTypeError::MissingSubtype(s.to_string()))?
        };
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return Err(MediaTypeError::Empty(s.to_string()));
        }
        if kind == WILDCARD && subtype != WILDCARD {
            return Err(MediaTypeError::WildcardType(s.to_string()));
        }

        let mut media = MediaType::new(kind, subtype);
        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim().trim_matches('"');
            if name.eq_ignore_ascii_case("q") {
                let q: f32 = value
                    .parse()
                    .map_err(|_| MediaTypeError::InvalidQuality(s.to_string()))?;
                if !(0.0..=1.0).contains(&q) {
                    return Err(MediaTypeError::InvalidQuality(s.to_string()));
                }
                media.quality = q;
            } else {
                media = media.with_param(name, value);
            }
        }
        Ok(media)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.params {
            write!(f, ";{name}={value}")?;
        }
        Ok(())
    }
}

/// Parse one or more `Accept` header values into a list of media ranges.
///
/// Empty values are skipped; an empty result means "accept anything".
///
/// # Errors
///
/// Returns the first [`MediaTypeError`] encountered.
pub fn parse_accept<'a, I>(values: I) -> Result<Vec<MediaType>, MediaTypeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for value in values {
        for range in value.split(',') {
            let range = range.trim();
            if range.is_empty() {
                continue;
            }
            out.push(range.parse()?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_quality_and_params() {
        let m: MediaType = "text/html; charset=UTF-8; q=0.7".parse().unwrap();
        assert_eq!(m.kind(), "text");
        assert_eq!(m.subtype(), "html");
        assert_eq!(m.param("charset"), Some("UTF-8"));
        assert!((m.quality() - 0.7).abs() < f32::EPSILON);
        assert_eq!(m.to_string(), "text/html;charset=UTF-8");
    }

    #[test]
    fn test_parse_wildcards() {
        let any: MediaType = "*".parse().unwrap();
        assert_eq!(any, MediaType::wildcard());
        let text: MediaType = "TEXT/*".parse().unwrap();
        assert_eq!(text.specificity(), 1);
        assert_eq!(text.kind(), "text");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "text".parse::<MediaType>(),
            Err(MediaTypeError::MissingSubtype(_))
        ));
        assert!(matches!(
            "*/xml".parse::<MediaType>(),
            Err(MediaTypeError::WildcardType(_))
        ));
        assert!(matches!(
            "text/plain;q=1.5".parse::<MediaType>(),
            Err(MediaTypeError::InvalidQuality(_))
        ));
        assert!(matches!(
            "text/plain;q=abc".parse::<MediaType>(),
            Err(MediaTypeError::InvalidQuality(_))
        ));
    }

    #[test]
    fn test_compatibility() {
        let json = MediaType::new("application", "json");
        assert!(json.is_compatible(&MediaType::wildcard()));
        assert!(json.is_compatible(&MediaType::new("application", "*")));
        assert!(!json.is_compatible(&MediaType::new("text", "*")));
        assert!(!json.is_compatible(&MediaType::new("application", "xml")));
    }

    #[test]
    fn test_parse_accept_multiple_headers() {
        let accept =
            parse_accept(["text/plain;q=0.5, application/json", "", "*/*;q=0.1"]).unwrap();
        assert_eq!(accept.len(), 3);
        assert_eq!(accept[1].essence(), "application/json");
        assert!(parse_accept(std::iter::empty()).unwrap().is_empty());
    }
}
