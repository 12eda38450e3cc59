//! Quality and specificity based selection between declared and requested
//! media types.

use std::cmp::Ordering;

use once_cell::sync::Lazy;

use super::media_type::MediaType;
use crate::error::DispatchError;

/// `[*/*]`, used for an empty declaration list and an absent `Accept` header.
pub static ANY: Lazy<Vec<MediaType>> = Lazy::new(|| vec![MediaType::wildcard()]);

fn or_any(list: &[MediaType]) -> &[MediaType] {
    if list.is_empty() {
        &ANY
    } else {
        list
    }
}

/// Ranking of a single declared media type against an `Accept` list.
///
/// Compared field by field: accept quality, accept specificity, declared
/// specificity, and finally the declaration index where earlier wins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub quality: f32,
    pub accept_specificity: u8,
    pub declared_specificity: u8,
    pub declared_index: usize,
}

impl Score {
    /// Ordering where `Greater` means `self` is the better candidate.
    #[must_use]
    pub fn rank(&self, other: &Score) -> Ordering {
        self.quality
            .partial_cmp(&other.quality)
            .unwrap_or(Ordering::Equal)
            .then(self.accept_specificity.cmp(&other.accept_specificity))
            .then(self.declared_specificity.cmp(&other.declared_specificity))
            .then(other.declared_index.cmp(&self.declared_index))
    }
}

/// Outcome of producer negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiated {
    /// Concrete type to write, wildcards filled from the accept side.
    pub media_type: MediaType,
    pub score: Score,
}

/// Best producer for `declared` given the client's `accept` ranges, or `None`
/// when nothing is acceptable.
///
/// For each declared type the most specific compatible accept range decides
/// its quality; a quality of 0 rules the declared type out.
#[must_use]
pub fn best_producer(declared: &[MediaType], accept: &[MediaType]) -> Option<Negotiated> {
    let accept = or_any(accept);
    let mut best: Option<Negotiated> = None;

    for (index, produced) in or_any(declared).iter().enumerate() {
        let Some(range) = accept
            .iter()
            .filter(|a| a.is_compatible(produced))
            .max_by(|a, b| {
                a.specificity().cmp(&b.specificity()).then(
                    a.quality()
                        .partial_cmp(&b.quality())
                        .unwrap_or(Ordering::Equal),
                )
            })
        else {
            continue;
        };
        if range.quality() <= 0.0 {
            continue;
        }
        let score = Score {
            quality: range.quality(),
            accept_specificity: range.specificity(),
            declared_specificity: produced.specificity(),
            declared_index: index,
        };
        if best
            .as_ref()
            .map_or(true, |b| score.rank(&b.score) == Ordering::Greater)
        {
            best = Some(Negotiated {
                media_type: resolve(produced, range),
                score,
            });
        }
    }
    best
}

/// Fill wildcards of the declared type from the accept range.
fn resolve(declared: &MediaType, range: &MediaType) -> MediaType {
    if declared.specificity() == 2 {
        return declared.clone().with_quality(1.0);
    }
    let kind = if declared.is_wildcard_type() {
        range.kind()
    } else {
        declared.kind()
    };
    let subtype = if declared.is_wildcard_subtype() {
        range.subtype()
    } else {
        declared.subtype()
    };
    if kind == super::WILDCARD || subtype == super::WILDCARD {
        MediaType::octet_stream()
    } else {
        MediaType::new(kind, subtype)
    }
}

/// Select the response media type.
///
/// # Errors
///
/// [`DispatchError::NotAcceptable`] when no declared type is acceptable.
pub fn select_producer(
    declared: &[MediaType],
    accept: &[MediaType],
) -> Result<MediaType, DispatchError> {
    best_producer(declared, accept)
        .map(|n| n.media_type)
        .ok_or_else(|| {
            let accepted: Vec<String> = accept.iter().map(MediaType::essence).collect();
            DispatchError::NotAcceptable(format!(
                "none of [{}] can be produced",
                accepted.join(", ")
            ))
        })
}

/// Most specific declared type compatible with `content_type`, earliest
/// declaration first on equal specificity. `None` when nothing is compatible.
#[must_use]
pub fn best_consumer<'a>(
    declared: &'a [MediaType],
    content_type: &MediaType,
) -> Option<&'a MediaType> {
    or_any(declared)
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_compatible(content_type))
        .max_by(|(ia, a), (ib, b)| a.specificity().cmp(&b.specificity()).then(ib.cmp(ia)))
        .map(|(_, d)| d)
}

/// Select the declared consumes entry for the request content type.
///
/// # Errors
///
/// [`DispatchError::UnsupportedMediaType`] when the content type is not
/// consumed.
pub fn select_consumer(
    declared: &[MediaType],
    content_type: &MediaType,
) -> Result<MediaType, DispatchError> {
    best_consumer(declared, content_type)
        .cloned()
        .ok_or_else(|| {
            DispatchError::UnsupportedMediaType(format!(
                "content type {} is not consumed",
                content_type.essence()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::parse_accept;

    fn types(list: &[&str]) -> Vec<MediaType> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn accept(header: &str) -> Vec<MediaType> {
        parse_accept([header]).unwrap()
    }

    #[test]
    fn test_concrete_beats_wildcard_on_equal_quality() {
        let declared = types(&["text/plain", "application/xml"]);
        let chosen =
            select_producer(&declared, &accept("application/*;q=0.5, text/plain;q=0.5")).unwrap();
        assert_eq!(chosen.essence(), "text/plain");
    }

    #[test]
    fn test_quality_is_primary_key() {
        let declared = types(&["text/plain", "application/json"]);
        let chosen =
            select_producer(&declared, &accept("text/plain;q=0.2, application/*;q=0.9")).unwrap();
        assert_eq!(chosen.essence(), "application/json");
    }

    #[test]
    fn test_concrete_declared_outranks_wildcard_declared() {
        for declared in [types(&["*/*", "text/plain"]), types(&["text/plain", "*/*"])] {
            let chosen = select_producer(&declared, &accept("text/plain")).unwrap();
            assert_eq!(chosen.essence(), "text/plain");
            let n = best_producer(&declared, &accept("text/plain")).unwrap();
            assert_eq!(n.score.declared_specificity, 2);
        }
    }

    #[test]
    fn test_zero_quality_excludes() {
        let declared = types(&["text/plain"]);
        let err = select_producer(&declared, &accept("text/plain;q=0, */*")).unwrap_err();
        assert_eq!(err.status(), 406);

        let declared = types(&["text/plain", "text/html"]);
        let chosen = select_producer(&declared, &accept("text/plain;q=0, */*")).unwrap();
        assert_eq!(chosen.essence(), "text/html");
    }

    #[test]
    fn test_empty_lists_mean_anything() {
        let chosen = select_producer(&types(&["application/json"]), &[]).unwrap();
        assert_eq!(chosen.essence(), "application/json");

        let chosen = select_producer(&[], &accept("text/csv")).unwrap();
        assert_eq!(chosen.essence(), "text/csv");

        let chosen = select_producer(&[], &[]).unwrap();
        assert_eq!(chosen, MediaType::octet_stream());
    }

    #[test]
    fn test_wildcard_declared_takes_accept_subtype() {
        let chosen = select_producer(&types(&["text/*"]), &accept("text/html")).unwrap();
        assert_eq!(chosen.essence(), "text/html");
        let chosen = select_producer(&types(&["text/*"]), &accept("*/*")).unwrap();
        assert_eq!(chosen, MediaType::octet_stream());
    }

    #[test]
    fn test_not_acceptable() {
        let err = select_producer(&types(&["application/json"]), &accept("text/html")).unwrap_err();
        assert!(matches!(err, DispatchError::NotAcceptable(_)));
    }

    #[test]
    fn test_consumer_selection() {
        let declared = types(&["application/*", "application/json"]);
        let ct: MediaType = "application/json; charset=utf-8".parse().unwrap();
        assert_eq!(
            select_consumer(&declared, &ct).unwrap().essence(),
            "application/json"
        );
        let err = select_consumer(&declared, &"text/plain".parse().unwrap()).unwrap_err();
        assert_eq!(err.status(), 415);
        assert!(select_consumer(&[], &ct).is_ok());
    }
}
