//! Personal state signals with intensity decay
//!
//! Self-reported personal state across five dimensions, each carrying a
//! categorical value, an intensity (1-5), and a declaration time.
//! Intensity decays exponentially toward a baseline; at baseline the
//! signal effectively clears. This layer reflects self-reported state
//! for adaptation purposes only, not diagnosis.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use vcp_core::{Result, VcpError};

/// The five personal state dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonalDimension {
    CognitiveState,
    EmotionalTone,
    EnergyLevel,
    PerceivedUrgency,
    BodySignals,
}

impl PersonalDimension {
    pub const ALL: [PersonalDimension; 5] = [
        PersonalDimension::CognitiveState,
        PersonalDimension::EmotionalTone,
        PersonalDimension::EnergyLevel,
        PersonalDimension::PerceivedUrgency,
        PersonalDimension::BodySignals,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CognitiveState => "cognitive_state",
            Self::EmotionalTone => "emotional_tone",
            Self::EnergyLevel => "energy_level",
            Self::PerceivedUrgency => "perceived_urgency",
            Self::BodySignals => "body_signals",
        }
    }

    /// Valid categorical values for this dimension.
    pub fn valid_values(self) -> &'static [&'static str] {
        match self {
            Self::CognitiveState => {
                &["focused", "distracted", "overloaded", "foggy", "reflective"]
            }
            Self::EmotionalTone => &["calm", "tense", "frustrated", "neutral", "uplifted"],
            Self::EnergyLevel => &["rested", "low_energy", "fatigued", "wired", "depleted"],
            Self::PerceivedUrgency => &["unhurried", "time_aware", "pressured", "critical"],
            Self::BodySignals => &["neutral", "discomfort", "pain", "unwell", "recovering"],
        }
    }

    /// Default decay behavior for this dimension.
    pub fn decay_config(self) -> DecayConfig {
        match self {
            // Urgency fades fast; body signals linger
            Self::PerceivedUrgency => DecayConfig {
                half_life_seconds: 900.0,
                ..DecayConfig::default()
            },
            Self::BodySignals => DecayConfig {
                half_life_seconds: 14_400.0,
                ..DecayConfig::default()
            },
            Self::CognitiveState => DecayConfig {
                half_life_seconds: 720.0,
                reset_on_engagement: true,
                ..DecayConfig::default()
            },
            Self::EmotionalTone => DecayConfig {
                half_life_seconds: 1_800.0,
                ..DecayConfig::default()
            },
            Self::EnergyLevel => DecayConfig {
                half_life_seconds: 7_200.0,
                ..DecayConfig::default()
            },
        }
    }
}

/// Whether a category belongs to any dimension's alphabet.
fn is_valid_category(category: &str) -> bool {
    PersonalDimension::ALL
        .into_iter()
        .any(|d| d.valid_values().contains(&category))
}

/// Lifecycle of a personal signal from declaration to expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Set,
    Active,
    Decaying,
    Stale,
    Expired,
}

/// A single personal state signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonalSignal {
    /// Categorical value, e.g. "focused", "calm", "rested"
    pub category: String,
    /// Signal intensity 1-5
    pub intensity: u8,
    /// How the signal was obtained: "declared", "inferred", "preset"
    pub source: String,
    /// Confidence 0.0-1.0
    pub confidence: f64,
    pub declared_at: Option<DateTime<Utc>>,
}

impl PersonalSignal {
    /// Create a validated signal with default intensity 3.
    ///
    /// # Errors
    ///
    /// Returns [`VcpError::Invalid`] for an unknown category, an
    /// intensity outside 1-5, or a confidence outside 0.0-1.0.
    pub fn new(category: impl Into<String>) -> Result<Self> {
        Self::with_intensity(category, 3)
    }

    /// Create a validated signal with an explicit intensity.
    pub fn with_intensity(category: impl Into<String>, intensity: u8) -> Result<Self> {
        let signal = Self {
            category: category.into(),
            intensity,
            source: "declared".to_string(),
            confidence: 1.0,
            declared_at: None,
        };
        signal.validate()?;
        Ok(signal)
    }

    pub fn declared_at(mut self, at: DateTime<Utc>) -> Self {
        self.declared_at = Some(at);
        self
    }

    fn validate(&self) -> Result<()> {
        if !is_valid_category(&self.category) {
            return Err(VcpError::invalid(format!(
                "invalid category '{}'",
                self.category
            )));
        }
        if !(1..=5).contains(&self.intensity) {
            return Err(VcpError::invalid(format!(
                "intensity must be 1-5, got {}",
                self.intensity
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(VcpError::invalid(format!(
                "confidence must be 0.0-1.0, got {}",
                self.confidence
            )));
        }
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        let mut result = json!({
            "category": self.category,
            "intensity": self.intensity,
            "source": self.source,
            "confidence": self.confidence,
        });
        if let Some(declared_at) = self.declared_at {
            result["declared_at"] = json!(vcp_core::types::format_utc(declared_at));
        }
        result
    }

    /// Parse from the wire object.
    pub fn from_value(data: &Value) -> Result<Self> {
        let category = data
            .get("category")
            .and_then(Value::as_str)
            .ok_or_else(|| VcpError::serialization("missing field: category"))?;
        let mut signal = Self::with_intensity(
            category,
            data.get("intensity").and_then(Value::as_u64).unwrap_or(3) as u8,
        )?;
        if let Some(source) = data.get("source").and_then(Value::as_str) {
            signal.source = source.to_string();
        }
        if let Some(confidence) = data.get("confidence").and_then(Value::as_f64) {
            signal.confidence = confidence;
            signal.validate()?;
        }
        if let Some(declared_at) = data.get("declared_at").and_then(Value::as_str) {
            signal.declared_at = Some(vcp_core::types::parse_utc(declared_at)?);
        }
        Ok(signal)
    }
}

/// Personal state context: one optional signal per dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonalContext {
    pub cognitive_state: Option<PersonalSignal>,
    pub emotional_tone: Option<PersonalSignal>,
    pub energy_level: Option<PersonalSignal>,
    pub perceived_urgency: Option<PersonalSignal>,
    pub body_signals: Option<PersonalSignal>,
}

impl PersonalContext {
    pub fn get(&self, dimension: PersonalDimension) -> Option<&PersonalSignal> {
        match dimension {
            PersonalDimension::CognitiveState => self.cognitive_state.as_ref(),
            PersonalDimension::EmotionalTone => self.emotional_tone.as_ref(),
            PersonalDimension::EnergyLevel => self.energy_level.as_ref(),
            PersonalDimension::PerceivedUrgency => self.perceived_urgency.as_ref(),
            PersonalDimension::BodySignals => self.body_signals.as_ref(),
        }
    }

    pub fn set(&mut self, dimension: PersonalDimension, signal: Option<PersonalSignal>) {
        match dimension {
            PersonalDimension::CognitiveState => self.cognitive_state = signal,
            PersonalDimension::EmotionalTone => self.emotional_tone = signal,
            PersonalDimension::EnergyLevel => self.energy_level = signal,
            PersonalDimension::PerceivedUrgency => self.perceived_urgency = signal,
            PersonalDimension::BodySignals => self.body_signals = signal,
        }
    }

    pub fn has_any_signal(&self) -> bool {
        PersonalDimension::ALL
            .into_iter()
            .any(|d| self.get(d).is_some())
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for dimension in PersonalDimension::ALL {
            let value = match self.get(dimension) {
                Some(signal) => signal.to_value(),
                None => Value::Null,
            };
            map.insert(dimension.as_str().to_string(), value);
        }
        Value::Object(map)
    }

    pub fn from_value(data: &Value) -> Result<Self> {
        let mut context = Self::default();
        for dimension in PersonalDimension::ALL {
            if let Some(raw) = data.get(dimension.as_str()) {
                if !raw.is_null() {
                    context.set(dimension, Some(PersonalSignal::from_value(raw)?));
                }
            }
        }
        Ok(context)
    }
}

/// Decay behavior for a personal dimension.
///
/// Intensity decays from the declared value toward the baseline:
/// `baseline + (declared - baseline) * 0.5^(elapsed / half_life)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayConfig {
    pub half_life_seconds: f64,
    /// Intensity at which the signal effectively clears
    pub baseline: u8,
    /// Pinned signals never decay
    pub pinned: bool,
    /// Re-engagement resets the decay timer
    pub reset_on_engagement: bool,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            half_life_seconds: 1_800.0,
            baseline: 1,
            pinned: false,
            reset_on_engagement: false,
        }
    }
}

/// Decayed intensity at time `now`, never below the baseline.
pub fn compute_decayed_intensity(
    declared_intensity: u8,
    declared_at: DateTime<Utc>,
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> u8 {
    if config.pinned {
        return declared_intensity;
    }

    let elapsed = (now - declared_at).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return declared_intensity;
    }

    let remaining = 0.5f64.powf(elapsed / config.half_life_seconds);
    let decayed = f64::from(config.baseline)
        + (f64::from(declared_intensity) - f64::from(config.baseline)) * remaining;

    (decayed.floor() as u8).max(config.baseline)
}

/// Lifecycle classification for a signal relative to its decay state.
pub fn lifecycle_state(
    signal: &PersonalSignal,
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> LifecycleState {
    let Some(declared_at) = signal.declared_at else {
        return LifecycleState::Set;
    };
    let current = compute_decayed_intensity(signal.intensity, declared_at, config, now);

    if current <= config.baseline {
        if (now - declared_at).num_seconds() as f64 > config.half_life_seconds * 8.0 {
            LifecycleState::Expired
        } else {
            LifecycleState::Stale
        }
    } else if current < signal.intensity {
        LifecycleState::Decaying
    } else {
        LifecycleState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vcp_core::types::parse_utc;

    fn t0() -> DateTime<Utc> {
        parse_utc("2026-01-10T12:00:00Z").unwrap()
    }

    #[test]
    fn valid_signal_defaults() {
        let signal = PersonalSignal::new("focused").unwrap();
        assert_eq!(signal.intensity, 3);
        assert_eq!(signal.source, "declared");
        assert!((signal.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(PersonalSignal::new("euphoric").is_err());
        assert!(PersonalSignal::with_intensity("focused", 0).is_err());
        assert!(PersonalSignal::with_intensity("focused", 6).is_err());
    }

    #[test]
    fn every_dimension_has_distinct_alphabet() {
        for dimension in PersonalDimension::ALL {
            assert!(!dimension.valid_values().is_empty());
            for value in dimension.valid_values() {
                assert!(is_valid_category(value));
            }
        }
    }

    #[test]
    fn context_roundtrip() {
        let mut context = PersonalContext::default();
        assert!(!context.has_any_signal());

        context.set(
            PersonalDimension::CognitiveState,
            Some(PersonalSignal::new("focused").unwrap().declared_at(t0())),
        );
        context.set(
            PersonalDimension::PerceivedUrgency,
            Some(PersonalSignal::with_intensity("pressured", 4).unwrap()),
        );
        assert!(context.has_any_signal());

        let parsed = PersonalContext::from_value(&context.to_value()).unwrap();
        assert_eq!(parsed, context);
        assert!(parsed.get(PersonalDimension::EnergyLevel).is_none());
    }

    #[test]
    fn no_decay_at_declaration() {
        let config = PersonalDimension::PerceivedUrgency.decay_config();
        assert_eq!(compute_decayed_intensity(5, t0(), &config, t0()), 5);
    }

    #[test]
    fn half_life_halves_distance_to_baseline() {
        let config = PersonalDimension::PerceivedUrgency.decay_config();
        let later = t0() + Duration::seconds(900);
        // 1 + (5-1) * 0.5 = 3.0
        assert_eq!(compute_decayed_intensity(5, t0(), &config, later), 3);
    }

    #[test]
    fn decay_never_drops_below_baseline() {
        let config = PersonalDimension::CognitiveState.decay_config();
        let much_later = t0() + Duration::days(2);
        assert_eq!(compute_decayed_intensity(5, t0(), &config, much_later), 1);
    }

    #[test]
    fn pinned_signals_do_not_decay() {
        let config = DecayConfig {
            pinned: true,
            ..DecayConfig::default()
        };
        let later = t0() + Duration::days(30);
        assert_eq!(compute_decayed_intensity(5, t0(), &config, later), 5);
    }

    #[test]
    fn lifecycle_progression() {
        let config = PersonalDimension::EmotionalTone.decay_config();
        let signal = PersonalSignal::with_intensity("tense", 5)
            .unwrap()
            .declared_at(t0());

        assert_eq!(lifecycle_state(&signal, &config, t0()), LifecycleState::Active);
        assert_eq!(
            lifecycle_state(&signal, &config, t0() + Duration::seconds(1_800)),
            LifecycleState::Decaying
        );
        assert_eq!(
            lifecycle_state(&signal, &config, t0() + Duration::seconds(7_000)),
            LifecycleState::Stale
        );
        assert_eq!(
            lifecycle_state(&signal, &config, t0() + Duration::days(1)),
            LifecycleState::Expired
        );
    }
}
