//! CSM1 compact profile codec
//!
//! CSM1 is a compact encoding for constitutional profiles: a persona
//! character, an adherence level, optional scope characters, and
//! optional namespace/version qualifiers.
//!
//! ```text
//! code = persona level *("+" scope) [":" namespace] ["@" version]
//! ```
//!
//! Examples: `N5+F+E`, `Z3+P`, `G4:ELEM`, `M2@1.0.0`.

use once_cell::sync::Lazy;
use regex::Regex;
use vcp_core::{Result, VcpError};

/// Archetypal personas for constitutional profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// Child safety specialist
    Nanny,
    /// Security and privacy guardian
    Sentinel,
    /// Ethical guidance counselor
    Godparent,
    /// Professional conduct advisor
    Ambassador,
    /// Creative challenge and provocation
    Muse,
    /// Fair resolution and balanced governance
    Mediator,
    /// User-defined persona
    Custom,
}

impl Persona {
    pub fn code(self) -> char {
        match self {
            Self::Nanny => 'N',
            Self::Sentinel => 'Z',
            Self::Godparent => 'G',
            Self::Ambassador => 'A',
            Self::Muse => 'M',
            Self::Mediator => 'D',
            Self::Custom => 'C',
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'N' => Ok(Self::Nanny),
            'Z' => Ok(Self::Sentinel),
            'G' => Ok(Self::Godparent),
            'A' => Ok(Self::Ambassador),
            'M' => Ok(Self::Muse),
            'D' => Ok(Self::Mediator),
            'C' => Ok(Self::Custom),
            other => Err(VcpError::invalid(format!("unknown persona character: {other}"))),
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Nanny => "Child safety specialist",
            Self::Sentinel => "Security and privacy guardian",
            Self::Godparent => "Ethical guidance counselor",
            Self::Ambassador => "Professional conduct advisor",
            Self::Muse => "Creative challenge and provocation",
            Self::Mediator => "Fair resolution and balanced governance",
            Self::Custom => "User-defined persona",
        }
    }
}

/// Context scopes a profile applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileScope {
    Family,
    Work,
    Education,
    Healthcare,
    Finance,
    Legal,
    Privacy,
    Safety,
    Accessibility,
    Environment,
    General,
}

impl ProfileScope {
    pub fn code(self) -> char {
        match self {
            Self::Family => 'F',
            Self::Work => 'W',
            Self::Education => 'E',
            Self::Healthcare => 'H',
            Self::Finance => 'I',
            Self::Legal => 'L',
            Self::Privacy => 'P',
            Self::Safety => 'S',
            Self::Accessibility => 'A',
            Self::Environment => 'V',
            Self::General => 'G',
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'F' => Ok(Self::Family),
            'W' => Ok(Self::Work),
            'E' => Ok(Self::Education),
            'H' => Ok(Self::Healthcare),
            'I' => Ok(Self::Finance),
            'L' => Ok(Self::Legal),
            'P' => Ok(Self::Privacy),
            'S' => Ok(Self::Safety),
            'A' => Ok(Self::Accessibility),
            'V' => Ok(Self::Environment),
            'G' => Ok(Self::General),
            other => Err(VcpError::invalid(format!("unknown scope character: {other}"))),
        }
    }
}

static CSM1_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<persona>[NZGAMDC])(?P<level>[0-5])(?P<scopes>(?:\+[FWEHILPSAVG])*)(?::(?P<namespace>[A-Z][A-Z0-9]*))?(?:@(?P<version>\d+\.\d+\.\d+))?$",
    )
    .unwrap_or_else(|_| unreachable!())
});

/// Parsed CSM1 constitutional code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Csm1Code {
    pub persona: Persona,
    /// 0 = disabled, 5 = maximum
    pub adherence_level: u8,
    pub scopes: Vec<ProfileScope>,
    pub namespace: Option<String>,
    pub version: Option<String>,
}

impl Csm1Code {
    pub const MIN_LEVEL: u8 = 0;
    pub const MAX_LEVEL: u8 = 5;

    /// Parse a CSM1 code string (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] when the string does not match the
    /// grammar.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(VcpError::invalid("CSM1 code cannot be empty"));
        }

        let upper = raw.to_ascii_uppercase();
        let captures = CSM1_PATTERN
            .captures(&upper)
            .ok_or_else(|| VcpError::invalid(format!("invalid CSM1 code: {raw}")))?;

        let persona = Persona::from_char(
            captures
                .name("persona")
                .and_then(|m| m.as_str().chars().next())
                .unwrap_or('C'),
        )?;
        let adherence_level = captures
            .name("level")
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .unwrap_or(0);

        let scopes = captures
            .name("scopes")
            .map(|m| {
                m.as_str()
                    .chars()
                    .filter(|c| *c != '+')
                    .map(ProfileScope::from_char)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            persona,
            adherence_level,
            scopes,
            namespace: captures.name("namespace").map(|m| m.as_str().to_string()),
            version: captures.name("version").map(|m| m.as_str().to_string()),
        })
    }

    /// Encode back to the CSM1 string form.
    pub fn encode(&self) -> String {
        let mut result = format!("{}{}", self.persona.code(), self.adherence_level);
        for scope in &self.scopes {
            result.push('+');
            result.push(scope.code());
        }
        if let Some(namespace) = &self.namespace {
            result.push(':');
            result.push_str(namespace);
        }
        if let Some(version) = &self.version {
            result.push('@');
            result.push_str(version);
        }
        result
    }

    /// Whether this code applies to a scope. Empty scopes apply to all.
    pub fn applies_to(&self, scope: ProfileScope) -> bool {
        self.scopes.is_empty() || self.scopes.contains(&scope)
    }

    /// New code with the given adherence level.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] when the level exceeds 5.
    pub fn with_level(&self, level: u8) -> Result<Self> {
        if level > Self::MAX_LEVEL {
            return Err(VcpError::invalid(format!(
                "level must be {}-{}",
                Self::MIN_LEVEL,
                Self::MAX_LEVEL
            )));
        }
        Ok(Self {
            adherence_level: level,
            ..self.clone()
        })
    }

    /// New code with the given scope list.
    pub fn with_scopes(&self, scopes: Vec<ProfileScope>) -> Self {
        Self {
            scopes,
            ..self.clone()
        }
    }

    pub fn is_active(&self) -> bool {
        self.adherence_level > 0
    }

    pub fn is_maximum(&self) -> bool {
        self.adherence_level == Self::MAX_LEVEL
    }
}

impl std::fmt::Display for Csm1Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
