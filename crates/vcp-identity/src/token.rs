//! VCP/I token parsing and validation
//!
//! Token grammar:
//!
//! ```text
//! token     = segment 2*9("." segment) ["@" version] [":" namespace]
//! segment   = ALPHA *31(ALPHA / DIGIT / "-")    ; lowercase
//! version   = 1*DIGIT "." 1*DIGIT "." 1*DIGIT
//! namespace = UPALPHA *(UPALPHA / DIGIT)
//! ```
//!
//! The first segment is the domain, the last the role, the
//! second-to-last the approach. Tokens are immutable; derivation
//! methods return new values.

use once_cell::sync::Lazy;
use regex::Regex;
use vcp_core::{Result, VcpError};

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<path>[a-z][a-z0-9-]*(?:\.[a-z][a-z0-9-]*){2,})(?:@(?P<version>\d+\.\d+\.\d+))?(?::(?P<namespace>[A-Z][A-Z0-9]*))?$",
    )
    .unwrap_or_else(|_| unreachable!())
});

static SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap_or_else(|_| unreachable!()));

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap_or_else(|_| unreachable!()));

static NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9]*$").unwrap_or_else(|_| unreachable!()));

/// An immutable, validated VCP/I token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    segments: Vec<String>,
    version: Option<String>,
    namespace: Option<String>,
}

impl Token {
    pub const MAX_LENGTH: usize = 256;
    pub const MAX_SEGMENT: usize = 32;
    pub const MIN_SEGMENTS: usize = 3;
    pub const MAX_SEGMENTS: usize = 10;

    /// Parse and validate a token string.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] for any grammar violation: too few
    /// or too many segments, over-long segments, or malformed
    /// version/namespace qualifiers.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(VcpError::invalid("token cannot be empty"));
        }
        if raw.len() > Self::MAX_LENGTH {
            return Err(VcpError::invalid(format!(
                "token exceeds max length {}: {}",
                Self::MAX_LENGTH,
                raw.len()
            )));
        }

        let captures = TOKEN_PATTERN
            .captures(raw)
            .ok_or_else(|| VcpError::invalid(format!("invalid VCP/I token format: {raw}")))?;

        let path = captures
            .name("path")
            .map(|m| m.as_str())
            .unwrap_or_default();
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();

        if segments.len() > Self::MAX_SEGMENTS {
            return Err(VcpError::invalid(format!(
                "token exceeds maximum {} segments, got {}",
                Self::MAX_SEGMENTS,
                segments.len()
            )));
        }
        for (i, segment) in segments.iter().enumerate() {
            if segment.len() > Self::MAX_SEGMENT {
                return Err(VcpError::invalid(format!(
                    "segment {} exceeds max length {}: {segment}",
                    i + 1,
                    Self::MAX_SEGMENT
                )));
            }
        }

        Ok(Self {
            segments,
            version: captures.name("version").map(|m| m.as_str().to_string()),
            namespace: captures.name("namespace").map(|m| m.as_str().to_string()),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// First segment (domain/category).
    pub fn domain(&self) -> &str {
        &self.segments[0]
    }

    /// Second-to-last segment (approach/method).
    pub fn approach(&self) -> &str {
        &self.segments[self.segments.len() - 2]
    }

    /// Last segment (role/function).
    pub fn role(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Middle segments between domain and approach (empty for
    /// 3-segment tokens).
    pub fn path(&self) -> &[String] {
        if self.segments.len() <= 3 {
            &[]
        } else {
            &self.segments[1..self.segments.len() - 2]
        }
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Canonical form: dot-joined segments, no version or namespace.
    pub fn canonical(&self) -> String {
        self.segments.join(".")
    }

    /// Full form: canonical plus version and namespace qualifiers.
    pub fn full(&self) -> String {
        let mut result = self.canonical();
        if let Some(version) = &self.version {
            result.push('@');
            result.push_str(version);
        }
        if let Some(namespace) = &self.namespace {
            result.push(':');
            result.push_str(namespace);
        }
        result
    }

    /// Bundle URI form: `creed://{registry}/{canonical}[@version]`.
    pub fn to_uri(&self, registry: &str) -> String {
        match &self.version {
            Some(version) => format!("creed://{registry}/{}@{version}", self.canonical()),
            None => format!("creed://{registry}/{}", self.canonical()),
        }
    }

    /// New token with the given version.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] for a malformed version.
    pub fn with_version(&self, version: &str) -> Result<Self> {
        if !VERSION_PATTERN.is_match(version) {
            return Err(VcpError::invalid(format!("invalid version format: {version}")));
        }
        Ok(Self {
            segments: self.segments.clone(),
            version: Some(version.to_string()),
            namespace: self.namespace.clone(),
        })
    }

    /// New token with the given namespace.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] for a malformed namespace.
    pub fn with_namespace(&self, namespace: &str) -> Result<Self> {
        if !NAMESPACE_PATTERN.is_match(namespace) {
            return Err(VcpError::invalid(format!(
                "invalid namespace format: {namespace}"
            )));
        }
        Ok(Self {
            segments: self.segments.clone(),
            version: self.version.clone(),
            namespace: Some(namespace.to_string()),
        })
    }

    /// Parent token (one segment shorter, version dropped), or `None`
    /// at minimum depth.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= Self::MIN_SEGMENTS {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            version: None,
            namespace: self.namespace.clone(),
        })
    }

    /// Child token with an appended segment (version dropped).
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] for a malformed segment or when
    /// already at maximum depth.
    pub fn child(&self, segment: &str) -> Result<Self> {
        if !SEGMENT_PATTERN.is_match(segment) {
            return Err(VcpError::invalid(format!("invalid segment format: {segment}")));
        }
        if self.segments.len() >= Self::MAX_SEGMENTS {
            return Err(VcpError::invalid(format!(
                "cannot add segment: max depth {}",
                Self::MAX_SEGMENTS
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self {
            segments,
            version: None,
            namespace: self.namespace.clone(),
        })
    }

    /// Glob-style pattern match over segments.
    ///
    /// `*` matches exactly one segment; `**` matches zero or more
    /// segments (at most one `**` is honored, at its first position).
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        let parts: Vec<&str> = pattern.split('.').collect();

        if let Some(star_idx) = parts.iter().position(|p| *p == "**") {
            let prefix = &parts[..star_idx];
            let suffix = &parts[star_idx + 1..];

            if self.segments.len() < prefix.len() + suffix.len() {
                return false;
            }
            for (segment, part) in self.segments.iter().zip(prefix.iter()) {
                if *part != "*" && *part != segment.as_str() {
                    return false;
                }
            }
            for (i, part) in suffix.iter().enumerate() {
                let segment = &self.segments[self.segments.len() - suffix.len() + i];
                if *part != "*" && *part != segment.as_str() {
                    return false;
                }
            }
            return true;
        }

        if parts.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(parts.iter())
            .all(|(segment, part)| *part == "*" || *part == segment.as_str())
    }

    /// True when this token's segments are a strict prefix of the
    /// other's.
    pub fn is_ancestor_of(&self, other: &Token) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    pub fn is_descendant_of(&self, other: &Token) -> bool {
        other.is_ancestor_of(self)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full())
    }
}

impl std::str::FromStr for Token {
    type Err = VcpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_segment_token() {
        let token = Token::parse("family.safe.guide").unwrap();
        assert_eq!(token.domain(), "family");
        assert_eq!(token.approach(), "safe");
        assert_eq!(token.role(), "guide");
        assert_eq!(token.depth(), 3);
        assert!(token.path().is_empty());
        assert_eq!(token.canonical(), "family.safe.guide");
    }

    #[test]
    fn parses_qualifiers() {
        let token = Token::parse("company.acme.legal.compliance@1.2.0:SEC").unwrap();
        assert_eq!(token.version(), Some("1.2.0"));
        assert_eq!(token.namespace(), Some("SEC"));
        assert_eq!(token.full(), "company.acme.legal.compliance@1.2.0:SEC");
        assert_eq!(token.canonical(), "company.acme.legal.compliance");
        assert_eq!(token.path(), ["acme".to_string()]);
    }

    #[test]
    fn rejects_bad_tokens() {
        for raw in [
            "",
            "two.segments",
            "Upper.case.bad",
            "1starts.with.digit",
            "family.safe.guide@1.2",
            "family.safe.guide:lower",
            "a.b.c.d.e.f.g.h.i.j.k",
        ] {
            assert!(Token::parse(raw).is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn rejects_overlong_segment() {
        let long = "x".repeat(33);
        assert!(Token::parse(&format!("{long}.safe.guide")).is_err());
    }

    #[test]
    fn derivation_produces_new_values() {
        let token = Token::parse("family.safe.guide").unwrap();
        let versioned = token.with_version("2.0.1").unwrap();
        assert_eq!(versioned.version(), Some("2.0.1"));
        assert_eq!(token.version(), None);

        let child = token.child("teen").unwrap();
        assert_eq!(child.canonical(), "family.safe.guide.teen");
        assert_eq!(child.parent().unwrap().canonical(), "family.safe.guide");
        assert!(token.parent().is_none());
    }

    #[test]
    fn uri_form() {
        let token = Token::parse("family.safe.guide@1.0.0").unwrap();
        assert_eq!(
            token.to_uri("creed.space"),
            "creed://creed.space/family.safe.guide@1.0.0"
        );
    }

    #[test]
    fn single_star_matches_one_segment() {
        let token = Token::parse("family.safe.guide").unwrap();
        assert!(token.matches_pattern("family.*.guide"));
        assert!(token.matches_pattern("*.*.*"));
        assert!(!token.matches_pattern("family.*"));
        assert!(!token.matches_pattern("family.*.*.guide"));
    }

    #[test]
    fn double_star_matches_any_depth() {
        let token = Token::parse("company.acme.legal.compliance").unwrap();
        assert!(token.matches_pattern("company.**"));
        assert!(token.matches_pattern("company.**.compliance"));
        assert!(!token.matches_pattern("company.acme.*"));
        assert!(token.matches_pattern("**.compliance"));

        let deep = Token::parse("a.b.c.d.e.f.g.h.i.x").unwrap();
        assert!(deep.matches_pattern("**.x"));
        let shallow = Token::parse("a.b.x").unwrap();
        assert!(shallow.matches_pattern("**.x"));
    }

    #[test]
    fn ancestry() {
        let parent = Token::parse("company.acme.legal").unwrap();
        let child = Token::parse("company.acme.legal.compliance").unwrap();
        assert!(parent.is_ancestor_of(&child));
        assert!(child.is_descendant_of(&parent));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&parent.clone()));
    }
}
