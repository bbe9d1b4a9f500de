//! Composite key codec for nodegraph resources.
//!
//! Every resource the graph engine exposes is addressed by a composite key of
//! the form `tool:domain[:kind]:id`:
//!
//! - `tool` names the store that issued the key (e.g. `url-db`)
//! - `domain` is the domain the resource lives in
//! - `kind` is an optional resource kind (omitted for nodes)
//! - `id` is the resource's positive integer id
//!
//! The string form is the one wire format outer protocol layers embed
//! directly, so [`encode`] and [`decode`] must round-trip exactly.
//!
//! # Example
//!
//! ```
//! use nodegraph_key::{decode, encode, CompositeKey};
//!
//! let key = encode("url-db", "docs", None, 42)?;
//! assert_eq!(key, "url-db:docs:42");
//!
//! let parsed: CompositeKey = decode(&key)?;
//! assert_eq!(parsed.domain(), "docs");
//! assert_eq!(parsed.id(), 42);
//! # Ok::<(), nodegraph_key::KeyError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
mod normalize;

pub use error::{KeyError, Result, Segment};
pub use normalize::normalize_segment;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Maximum length of the tool segment in bytes.
pub const MAX_TOOL_LENGTH: usize = 50;

/// Maximum length of the domain and kind segments in bytes.
pub const MAX_DOMAIN_LENGTH: usize = 50;

/// Maximum number of digits in the id segment.
pub const MAX_ID_LENGTH: usize = 20;

/// A decoded composite key.
///
/// Serializes as its string form so it can be embedded in protocol payloads
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompositeKey {
    tool: String,
    domain: String,
    kind: Option<String>,
    id: i64,
}

impl CompositeKey {
    /// Build a key from its parts, validating every segment.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if a segment is empty, too long, contains the
    /// separator, or if `id` is not positive.
    pub fn new(
        tool: impl Into<String>,
        domain: impl Into<String>,
        kind: Option<String>,
        id: i64,
    ) -> Result<Self> {
        let tool = tool.into();
        let domain = domain.into();
        validate_segment(Segment::Tool, &tool, MAX_TOOL_LENGTH)?;
        validate_segment(Segment::Domain, &domain, MAX_DOMAIN_LENGTH)?;
        if let Some(kind) = &kind {
            validate_segment(Segment::Kind, kind, MAX_DOMAIN_LENGTH)?;
        }
        if id <= 0 {
            return Err(KeyError::InvalidId(id.to_string()));
        }

        Ok(Self {
            tool,
            domain,
            kind,
            id,
        })
    }

    /// Build a key for a node (no kind segment).
    ///
    /// # Errors
    ///
    /// See [`CompositeKey::new`].
    pub fn node(tool: impl Into<String>, domain: impl Into<String>, id: i64) -> Result<Self> {
        Self::new(tool, domain, None, id)
    }

    /// Build a key from free-form tool and domain names, normalizing both
    /// with [`normalize_segment`] first.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if either name normalizes to an empty string or
    /// exceeds its length limit.
    pub fn normalized(tool: &str, domain: &str, id: i64) -> Result<Self> {
        Self::node(normalize_segment(tool), normalize_segment(domain), id)
    }

    /// The tool segment.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// The domain segment.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The optional kind segment.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// The numeric id.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(
                f,
                "{}{SEPARATOR}{}{SEPARATOR}{kind}{SEPARATOR}{}",
                self.tool, self.domain, self.id
            ),
            None => write!(f, "{}{SEPARATOR}{}{SEPARATOR}{}", self.tool, self.domain, self.id),
        }
    }
}

impl FromStr for CompositeKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

impl TryFrom<String> for CompositeKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self> {
        decode(&value)
    }
}

impl From<CompositeKey> for String {
    fn from(key: CompositeKey) -> Self {
        key.to_string()
    }
}

/// Encode key parts into their string form.
///
/// # Errors
///
/// Returns [`KeyError::InvalidSegment`] if any segment is empty or contains
/// the separator, [`KeyError::TooLong`] for oversized segments, and
/// [`KeyError::InvalidId`] if `id` is not positive.
pub fn encode(tool: &str, domain: &str, kind: Option<&str>, id: i64) -> Result<String> {
    CompositeKey::new(tool, domain, kind.map(str::to_string), id).map(|key| key.to_string())
}

/// Decode a composite key string.
///
/// # Errors
///
/// Returns [`KeyError::InvalidFormat`] unless the key has exactly 3 or 4
/// segments, and [`KeyError::InvalidId`] if the last segment is not a
/// positive integer.
pub fn decode(key: &str) -> Result<CompositeKey> {
    let parts: Vec<&str> = key.split(SEPARATOR).collect();
    let (tool, domain, kind, id) = match parts.as_slice() {
        [tool, domain, id] => (*tool, *domain, None, *id),
        [tool, domain, kind, id] => (*tool, *domain, Some(*kind), *id),
        _ => {
            return Err(KeyError::InvalidFormat {
                key: key.to_string(),
                segments: parts.len(),
            });
        }
    };

    let id = parse_id(id)?;
    CompositeKey::new(tool, domain, kind.map(str::to_string), id)
}

/// Returns `true` if `key` decodes successfully.
#[must_use]
pub fn is_valid(key: &str) -> bool {
    decode(key).is_ok()
}

fn parse_id(raw: &str) -> Result<i64> {
    if raw.is_empty() {
        return Err(KeyError::InvalidSegment {
            segment: Segment::Id,
            value: String::new(),
            reason: "must not be empty",
        });
    }
    if raw.len() > MAX_ID_LENGTH {
        return Err(KeyError::TooLong {
            segment: Segment::Id,
            len: raw.len(),
            max: MAX_ID_LENGTH,
        });
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::InvalidId(raw.to_string()));
    }

    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(KeyError::InvalidId(raw.to_string())),
    }
}

fn validate_segment(segment: Segment, value: &str, max: usize) -> Result<()> {
    if value.is_empty() {
        return Err(KeyError::InvalidSegment {
            segment,
            value: String::new(),
            reason: "must not be empty",
        });
    }
    if value.contains(SEPARATOR) {
        return Err(KeyError::InvalidSegment {
            segment,
            value: value.to_string(),
            reason: "must not contain ':'",
        });
    }
    if value.len() > max {
        return Err(KeyError::TooLong {
            segment,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn encode_node_key() {
        assert_eq!(encode("url-db", "docs", None, 7).unwrap(), "url-db:docs:7");
    }

    #[test]
    fn encode_key_with_kind() {
        assert_eq!(
            encode("url-db", "docs", Some("subscription"), 3).unwrap(),
            "url-db:docs:subscription:3"
        );
    }

    #[test]
    fn decode_keeps_dotted_domains() {
        let key = decode("url-db:example.com:123").unwrap();
        assert_eq!(key.tool(), "url-db");
        assert_eq!(key.domain(), "example.com");
        assert_eq!(key.kind(), None);
        assert_eq!(key.id(), 123);
    }

    #[rstest]
    #[case::too_few("url-db:123", 2)]
    #[case::too_many("a:b:c:d:1", 5)]
    #[case::single("plain", 1)]
    fn decode_rejects_wrong_segment_count(#[case] input: &str, #[case] expected: usize) {
        match decode(input) {
            Err(KeyError::InvalidFormat { segments, .. }) => assert_eq!(segments, expected),
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[rstest]
    #[case::word("url-db:docs:abc")]
    #[case::zero("url-db:docs:0")]
    #[case::signed("url-db:docs:+5")]
    #[case::negative("url-db:docs:-5")]
    #[case::overflow("url-db:docs:99999999999999999999")]
    fn decode_rejects_bad_ids(#[case] input: &str) {
        assert!(matches!(decode(input), Err(KeyError::InvalidId(_))));
    }

    #[test]
    fn decode_rejects_empty_segments() {
        assert!(matches!(
            decode(":docs:1"),
            Err(KeyError::InvalidSegment {
                segment: Segment::Tool,
                ..
            })
        ));
        assert!(matches!(
            decode("url-db::node:1"),
            Err(KeyError::InvalidSegment {
                segment: Segment::Domain,
                ..
            })
        ));
    }

    #[test]
    fn encode_rejects_separator_in_segment() {
        let err = encode("url-db", "a:b", None, 1).unwrap_err();
        assert!(matches!(
            err,
            KeyError::InvalidSegment {
                segment: Segment::Domain,
                ..
            }
        ));
    }

    #[test]
    fn encode_rejects_long_tool() {
        let tool = "t".repeat(MAX_TOOL_LENGTH + 1);
        assert!(matches!(
            encode(&tool, "docs", None, 1),
            Err(KeyError::TooLong {
                segment: Segment::Tool,
                ..
            })
        ));
    }

    #[test]
    fn serde_uses_string_form() {
        let key = CompositeKey::node("url-db", "docs", 9).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"url-db:docs:9\"");

        let back: CompositeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        let bad: std::result::Result<CompositeKey, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn normalized_key_cleans_names() {
        let key = CompositeKey::normalized("  URL DB ", "My Docs!", 4).unwrap();
        assert_eq!(key.to_string(), "url-db:my-docs:4");
    }
}
