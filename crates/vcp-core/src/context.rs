//! Nine-dimension context encoding and the constitution value type
//!
//! Context state is a mapping from each of nine fixed dimensions to an
//! ordered sequence of symbolic values drawn from that dimension's fixed
//! alphabet. The wire form pipes together per-dimension groups, each a
//! dimension symbol followed by its value symbols; empty dimensions are
//! omitted.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Result, VcpError};

/// The nine fixed context dimensions, in wire position order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    Time,
    Space,
    Company,
    Culture,
    Occasion,
    State,
    Environment,
    Agency,
    Constraints,
}

impl Dimension {
    /// All dimensions in position order.
    pub const ALL: [Dimension; 9] = [
        Dimension::Time,
        Dimension::Space,
        Dimension::Company,
        Dimension::Culture,
        Dimension::Occasion,
        Dimension::State,
        Dimension::Environment,
        Dimension::Agency,
        Dimension::Constraints,
    ];

    /// Lowercase dimension name used in the JSON form.
    pub fn name(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Space => "space",
            Self::Company => "company",
            Self::Culture => "culture",
            Self::Occasion => "occasion",
            Self::State => "state",
            Self::Environment => "environment",
            Self::Agency => "agency",
            Self::Constraints => "constraints",
        }
    }

    /// Symbol prefix for the wire form.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Time => "\u{23F0}",            // ⏰
            Self::Space => "\u{1F4CD}",          // 📍
            Self::Company => "\u{1F465}",        // 👥
            Self::Culture => "\u{1F30D}",        // 🌍
            Self::Occasion => "\u{1F3AD}",       // 🎭
            Self::State => "\u{1F9E0}",          // 🧠
            Self::Environment => "\u{1F321}\u{FE0F}", // 🌡️
            Self::Agency => "\u{1F537}",         // 🔷
            Self::Constraints => "\u{1F536}",    // 🔶
        }
    }

    /// 1-indexed wire position.
    pub fn position(self) -> u8 {
        self as u8 + 1
    }

    /// The dimension's fixed `(symbol, name)` value alphabet.
    pub fn alphabet(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Time => &[
                ("\u{1F305}", "morning"),
                ("\u{2600}\u{FE0F}", "midday"),
                ("\u{1F306}", "evening"),
                ("\u{1F319}", "night"),
            ],
            Self::Space => &[
                ("\u{1F3E1}", "home"),
                ("\u{1F3E2}", "office"),
                ("\u{1F3EB}", "school"),
                ("\u{1F3E5}", "hospital"),
                ("\u{1F697}", "transit"),
            ],
            Self::Company => &[
                ("\u{1F464}", "alone"),
                ("\u{1F476}", "children"),
                ("\u{1F454}", "colleagues"),
                ("\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}", "family"),
                ("\u{1F465}", "strangers"),
            ],
            Self::Culture => &[
                ("\u{1F30D}", "global"),
                ("\u{1F1FA}\u{1F1F8}", "american"),
                ("\u{1F1EA}\u{1F1FA}", "european"),
                ("\u{1F1EF}\u{1F1F5}", "japanese"),
            ],
            Self::Occasion => &[
                ("\u{2796}", "normal"),
                ("\u{1F382}", "celebration"),
                ("\u{1F622}", "mourning"),
                ("\u{1F6A8}", "emergency"),
            ],
            Self::State => &[
                ("\u{1F60A}", "happy"),
                ("\u{1F630}", "anxious"),
                ("\u{1F634}", "tired"),
                ("\u{1F914}", "contemplative"),
                ("\u{1F624}", "frustrated"),
            ],
            Self::Environment => &[
                ("\u{2600}\u{FE0F}", "comfortable"),
                ("\u{1F975}", "hot"),
                ("\u{1F976}", "cold"),
                ("\u{1F507}", "quiet"),
                ("\u{1F50A}", "noisy"),
            ],
            Self::Agency => &[
                ("\u{1F451}", "leader"),
                ("\u{1F91D}", "peer"),
                ("\u{1F4CB}", "subordinate"),
                ("\u{1F510}", "limited"),
            ],
            Self::Constraints => &[
                ("\u{25CB}", "minimal"),
                ("\u{2696}\u{FE0F}", "legal"),
                ("\u{1F4B8}", "economic"),
                ("\u{23F1}\u{FE0F}", "time"),
            ],
        }
    }

    /// Look up a dimension by its lowercase name.
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.name() == lower)
            .ok_or_else(|| VcpError::invalid(format!("unknown dimension: {name}")))
    }

    /// Symbol for a named value, if the name is in this dimension's alphabet.
    pub fn symbol_for(self, value: &str) -> Option<&'static str> {
        let lower = value.to_ascii_lowercase();
        self.alphabet()
            .iter()
            .find(|(_, name)| *name == lower)
            .map(|(symbol, _)| *symbol)
    }

    /// Name for a value symbol, if it is in this dimension's alphabet.
    pub fn name_for(self, symbol: &str) -> Option<&'static str> {
        self.alphabet()
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, name)| *name)
    }
}

/// Encoded context state across the nine dimensions.
///
/// Values are stored as symbols. A dimension absent from the map and a
/// dimension mapped to an empty sequence are equivalent.
#[derive(Debug, Clone, Default, Eq)]
pub struct VcpContext {
    dimensions: BTreeMap<Dimension, Vec<String>>,
}

impl VcpContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for a dimension (empty if unset).
    pub fn get(&self, dimension: Dimension) -> &[String] {
        self.dimensions
            .get(&dimension)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Return a new context with the dimension's values replaced.
    pub fn with(&self, dimension: Dimension, values: Vec<String>) -> Self {
        let mut dimensions = self.dimensions.clone();
        if values.is_empty() {
            dimensions.remove(&dimension);
        } else {
            dimensions.insert(dimension, values);
        }
        Self { dimensions }
    }

    /// True if the dimension has at least one value.
    pub fn has(&self, dimension: Dimension) -> bool {
        !self.get(dimension).is_empty()
    }

    /// True if any dimension has values.
    pub fn is_empty(&self) -> bool {
        self.dimensions.values().all(Vec::is_empty)
    }

    /// Iterate all value symbols across every dimension.
    pub fn all_values(&self) -> impl Iterator<Item = &str> {
        self.dimensions.values().flatten().map(String::as_str)
    }

    /// Encode to the wire form `sym₁v…|sym₂v…`; empty dimensions omitted.
    pub fn encode(&self) -> String {
        let mut parts = Vec::new();
        for dim in Dimension::ALL {
            let values = self.get(dim);
            if !values.is_empty() {
                parts.push(format!("{}{}", dim.symbol(), values.concat()));
            }
        }
        parts.join("|")
    }

    /// Decode from the wire form.
    ///
    /// Each pipe-separated group is matched against a dimension symbol
    /// prefix, then its remainder is split by longest-match against that
    /// dimension's alphabet. Unknown symbols are skipped.
    pub fn decode(encoded: &str) -> Self {
        let mut dimensions = BTreeMap::new();
        if encoded.is_empty() {
            return Self { dimensions };
        }

        for part in encoded.split('|') {
            if part.is_empty() {
                continue;
            }
            let Some(dim) = Dimension::ALL
                .into_iter()
                .find(|d| part.starts_with(d.symbol()))
            else {
                continue;
            };

            let mut rest = &part[dim.symbol().len()..];
            let mut values = Vec::new();
            while !rest.is_empty() {
                // Longest symbol first so ZWJ sequences win over their prefixes
                let matched = dim
                    .alphabet()
                    .iter()
                    .filter(|(symbol, _)| rest.starts_with(symbol))
                    .max_by_key(|(symbol, _)| symbol.len());
                match matched {
                    Some((symbol, _)) => {
                        values.push((*symbol).to_string());
                        rest = &rest[symbol.len()..];
                    }
                    None => {
                        let mut chars = rest.chars();
                        chars.next();
                        rest = chars.as_str();
                    }
                }
            }
            if !values.is_empty() {
                dimensions.insert(dim, values);
            }
        }

        Self { dimensions }
    }

    /// Convert to the JSON form: named values keyed by dimension name.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for dim in Dimension::ALL {
            let names: Vec<Value> = self
                .get(dim)
                .iter()
                .filter_map(|symbol| dim.name_for(symbol))
                .map(|name| Value::String(name.to_string()))
                .collect();
            map.insert(dim.name().to_string(), Value::Array(names));
        }
        Value::Object(map)
    }

    /// Build from the JSON form. Unknown dimensions and values are dropped.
    pub fn from_json(data: &Value) -> Self {
        let mut context = Self::new();
        let Some(obj) = data.as_object() else {
            return context;
        };
        for dim in Dimension::ALL {
            let Some(raw) = obj.get(dim.name()) else {
                continue;
            };
            let names: Vec<&str> = match raw {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                _ => continue,
            };
            let symbols: Vec<String> = names
                .iter()
                .filter_map(|name| dim.symbol_for(name))
                .map(str::to_string)
                .collect();
            if !symbols.is_empty() {
                context = context.with(dim, symbols);
            }
        }
        context
    }
}

impl PartialEq for VcpContext {
    fn eq(&self, other: &Self) -> bool {
        Dimension::ALL
            .into_iter()
            .all(|dim| self.get(dim) == other.get(dim))
    }
}

/// Minimal constitution representation for composition and hooks.
///
/// Rules are normalized on construction: whitespace-trimmed, empty rules
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constitution {
    pub id: String,
    pub rules: Vec<String>,
    /// Higher value means more precedence
    pub priority: i32,
}

impl Constitution {
    pub fn new(id: impl Into<String>, rules: Vec<String>) -> Self {
        Self::with_priority(id, rules, 0)
    }

    pub fn with_priority(id: impl Into<String>, rules: Vec<String>, priority: i32) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self {
            id: id.into(),
            rules,
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let ctx = VcpContext::new()
            .with(Dimension::Time, vec!["\u{1F305}".into()])
            .with(Dimension::Space, vec!["\u{1F3E1}".into()])
            .with(
                Dimension::Company,
                vec![
                    "\u{1F476}".into(),
                    "\u{1F468}\u{200D}\u{1F469}\u{200D}\u{1F467}".into(),
                ],
            );
        let encoded = ctx.encode();
        assert_eq!(VcpContext::decode(&encoded), ctx);
    }

    #[test]
    fn empty_dimensions_omitted_from_wire() {
        let ctx = VcpContext::new().with(Dimension::State, vec!["\u{1F60A}".into()]);
        let encoded = ctx.encode();
        assert!(!encoded.contains('|'));
        assert!(encoded.starts_with(Dimension::State.symbol()));
    }

    #[test]
    fn missing_and_empty_dimension_equal() {
        let a = VcpContext::new();
        let b = VcpContext::new().with(Dimension::Time, Vec::new());
        assert_eq!(a, b);
    }

    #[test]
    fn json_roundtrip_with_names() {
        let ctx = VcpContext::from_json(&serde_json::json!({
            "time": ["morning"],
            "company": ["children", "family"],
        }));
        assert_eq!(ctx.get(Dimension::Time), ["\u{1F305}".to_string()]);
        assert_eq!(ctx.get(Dimension::Company).len(), 2);

        let json = ctx.to_json();
        assert_eq!(json["time"], serde_json::json!(["morning"]));
        assert_eq!(json["company"], serde_json::json!(["children", "family"]));
    }

    #[test]
    fn unknown_values_dropped() {
        let ctx = VcpContext::from_json(&serde_json::json!({"time": ["brunch"]}));
        assert!(!ctx.has(Dimension::Time));
    }

    #[test]
    fn dimension_name_lookup() {
        assert_eq!(Dimension::from_name("occasion").unwrap(), Dimension::Occasion);
        assert!(Dimension::from_name("flavor").is_err());
        assert_eq!(Dimension::Time.position(), 1);
        assert_eq!(Dimension::Constraints.position(), 9);
    }

    #[test]
    fn constitution_rules_normalized() {
        let c = Constitution::new("base", vec!["  rule one  ".into(), "".into(), "rule two".into()]);
        assert_eq!(c.rules, vec!["rule one".to_string(), "rule two".to_string()]);
    }
}
