//! Context encoder: named values to symbolic dimensions
//!
//! Builds [`VcpContext`] values from human-readable names. Unknown
//! values are silently dropped; an unset dimension stays unset.

use vcp_core::{Dimension, VcpContext};

/// Fluent builder from named values onto the symbolic alphabet.
///
/// ```
/// use vcp_adaptation::ContextEncoder;
/// use vcp_core::Dimension;
///
/// let ctx = ContextEncoder::new()
///     .time("morning")
///     .space("home")
///     .company(&["children", "family"])
///     .build();
/// assert!(ctx.has(Dimension::Company));
/// ```
#[derive(Debug, Default)]
pub struct ContextEncoder {
    context: VcpContext,
}

impl ContextEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_one(self, dimension: Dimension, value: &str) -> Self {
        self.set_many(dimension, &[value])
    }

    fn set_many(mut self, dimension: Dimension, values: &[&str]) -> Self {
        let symbols: Vec<String> = values
            .iter()
            .filter_map(|value| dimension.symbol_for(value))
            .map(str::to_string)
            .collect();
        if !symbols.is_empty() {
            self.context = self.context.with(dimension, symbols);
        }
        self
    }

    pub fn time(self, value: &str) -> Self {
        self.set_one(Dimension::Time, value)
    }

    pub fn space(self, value: &str) -> Self {
        self.set_one(Dimension::Space, value)
    }

    pub fn company(self, values: &[&str]) -> Self {
        self.set_many(Dimension::Company, values)
    }

    pub fn culture(self, value: &str) -> Self {
        self.set_one(Dimension::Culture, value)
    }

    pub fn occasion(self, value: &str) -> Self {
        self.set_one(Dimension::Occasion, value)
    }

    pub fn state(self, value: &str) -> Self {
        self.set_one(Dimension::State, value)
    }

    pub fn environment(self, value: &str) -> Self {
        self.set_one(Dimension::Environment, value)
    }

    pub fn agency(self, value: &str) -> Self {
        self.set_one(Dimension::Agency, value)
    }

    pub fn constraints(self, values: &[&str]) -> Self {
        self.set_many(Dimension::Constraints, values)
    }

    /// Set any dimension by name; unknown names are ignored.
    pub fn dimension(self, name: &str, values: &[&str]) -> Self {
        match Dimension::from_name(name) {
            Ok(dimension) => self.set_many(dimension, values),
            Err(_) => self,
        }
    }

    pub fn build(self) -> VcpContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_named_values() {
        let ctx = ContextEncoder::new().time("morning").build();
        assert_eq!(ctx.get(Dimension::Time), [Dimension::Time.symbol_for("morning").unwrap()]);
    }

    #[test]
    fn unknown_values_silently_dropped() {
        let ctx = ContextEncoder::new()
            .time("brunch")
            .company(&["children", "robots"])
            .build();
        assert!(!ctx.has(Dimension::Time));
        assert_eq!(ctx.get(Dimension::Company).len(), 1);
    }

    #[test]
    fn unset_dimensions_stay_unset() {
        let ctx = ContextEncoder::new().space("office").build();
        assert!(ctx.has(Dimension::Space));
        assert!(!ctx.has(Dimension::Time));
        assert!(!ctx.has(Dimension::Agency));
    }

    #[test]
    fn dimension_by_name() {
        let ctx = ContextEncoder::new()
            .dimension("occasion", &["emergency"])
            .dimension("flavor", &["sweet"])
            .build();
        assert!(ctx.has(Dimension::Occasion));
    }

    #[test]
    fn case_insensitive_values() {
        let ctx = ContextEncoder::new().time("Morning").build();
        assert!(ctx.has(Dimension::Time));
    }
}
