//! Constitution composition engine

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};
use vcp_core::{CompositionMode, Constitution};
use vcp_hooks::{ChainStatus, HookEvent, HookExecutor, HookType};

/// Keywords that indicate potential conflicts, mapped to their
/// opposites. The baseline pairs are always/never, must/must not,
/// allow/forbid/prohibit, and require; "should not", "deny", and
/// "permit" are extensions to that baseline, recorded in DESIGN.md.
const CONFLICT_KEYWORDS: [(&str, &[&str]); 8] = [
    ("always", &["never"]),
    ("never", &["always"]),
    ("must", &["must not", "should not", "never"]),
    ("must not", &["must", "always"]),
    ("allow", &["forbid", "prohibit", "deny"]),
    ("forbid", &["allow", "permit"]),
    ("prohibit", &["allow", "permit"]),
    ("require", &["forbid", "prohibit"]),
];

/// Stop words excluded from the shared-topic heuristic.
const STOP_WORDS: [&str; 29] = [
    "the", "a", "an", "is", "are", "be", "to", "of", "and", "or", "in", "on", "at", "for", "with",
    "by", "from", "as", "it", "this", "that", "these", "those", "you", "we", "they", "i", "not",
    "do",
];

/// Classification of a detected conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictType {
    /// Direct keyword opposition (always/never, must/must not, allow/forbid)
    Contradiction,
    /// Lexicon hit without a direct opposition pair
    Tension,
    /// Same-topic rules that overlap without opposing keywords
    Overlap,
    /// Case-insensitive duplicate (strict mode only)
    Duplicate,
}

impl ConflictType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contradiction => "contradiction",
            Self::Tension => "tension",
            Self::Overlap => "overlap",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Detected conflict between two rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub rule_a: String,
    pub source_a: String,
    pub rule_b: String,
    pub source_b: String,
    pub conflict_type: ConflictType,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: '{}' ({}) vs '{}' ({})",
            self.conflict_type.as_str(),
            self.rule_a,
            self.source_a,
            self.rule_b,
            self.source_b
        )
    }
}

/// Raised when composition has unresolvable conflicts.
#[derive(Debug, Clone, thiserror::Error)]
#[error("composition has {} unresolvable conflict(s)", conflicts.len())]
pub struct CompositionConflictError {
    /// Every conflict found, in detection order
    pub conflicts: Vec<Conflict>,
}

/// Result of composing multiple constitutions.
#[derive(Debug, Clone)]
pub struct CompositionResult {
    pub merged_rules: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
    pub mode_used: CompositionMode,
}

/// Compose multiple constitutions according to mode.
#[derive(Default)]
pub struct Composer {
    hook_executor: Option<Arc<HookExecutor>>,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a hook executor so `on_conflict` chains can resolve
    /// conflicts that would otherwise be fatal.
    pub fn with_hook_executor(mut self, executor: Arc<HookExecutor>) -> Self {
        self.hook_executor = Some(executor);
        self
    }

    /// Compose constitutions in order.
    ///
    /// # Errors
    ///
    /// Returns [`CompositionConflictError`] for unresolved conflicts in
    /// `extend` mode and for any violation in `strict` mode, unless an
    /// `on_conflict` hook supplies a replacement ruleset.
    pub fn compose(
        &self,
        constitutions: &[Constitution],
        mode: CompositionMode,
    ) -> Result<CompositionResult, CompositionConflictError> {
        self.compose_for_session(constitutions, mode, "default")
    }

    /// Compose with an explicit session id for hook chain resolution.
    pub fn compose_for_session(
        &self,
        constitutions: &[Constitution],
        mode: CompositionMode,
        session_id: &str,
    ) -> Result<CompositionResult, CompositionConflictError> {
        if constitutions.is_empty() {
            return Ok(CompositionResult {
                merged_rules: Vec::new(),
                conflicts: Vec::new(),
                warnings: Vec::new(),
                mode_used: mode,
            });
        }

        let outcome = match mode {
            CompositionMode::Base => Ok(compose_base(constitutions)),
            CompositionMode::Extend => compose_extend(constitutions),
            CompositionMode::Override => Ok(compose_override(constitutions)),
            CompositionMode::Strict => compose_strict(constitutions),
        };

        match outcome {
            Ok(result) => Ok(result),
            Err(err) => self.resolve_via_hooks(err, mode, session_id),
        }
    }

    /// Offer fatal conflicts to the `on_conflict` chain. A `modify`
    /// result carrying a replacement constitution resolves the
    /// composition; anything else re-raises the original error.
    fn resolve_via_hooks(
        &self,
        err: CompositionConflictError,
        mode: CompositionMode,
        session_id: &str,
    ) -> Result<CompositionResult, CompositionConflictError> {
        let Some(executor) = &self.hook_executor else {
            return Err(err);
        };

        let event = HookEvent::Conflict {
            conflicting_rules: err.conflicts.iter().map(Conflict::to_string).collect(),
            composition_strategy: mode.as_str().to_string(),
            conflict_severity: "error".to_string(),
        };

        let chain = executor.execute(HookType::OnConflict, session_id, None, None, event, None);
        if chain.status == ChainStatus::Aborted {
            return Err(err);
        }
        match chain.constitution {
            Some(replacement) => {
                debug!(
                    conflicts = err.conflicts.len(),
                    "on_conflict hook supplied replacement ruleset"
                );
                let warnings = err.conflicts.iter().map(|c| c.to_string()).collect();
                Ok(CompositionResult {
                    merged_rules: replacement.rules,
                    conflicts: err.conflicts,
                    warnings,
                    mode_used: mode,
                })
            }
            None => Err(err),
        }
    }
}

/// BASE: the first constitution is authoritative; later rules are
/// appended only when they do not conflict with anything present.
fn compose_base(constitutions: &[Constitution]) -> CompositionResult {
    let base = &constitutions[0];
    let mut merged = base.rules.clone();
    let mut conflicts = Vec::new();

    for constitution in &constitutions[1..] {
        for rule in &constitution.rules {
            match detect_conflict(rule, &constitution.id, &merged, &base.id) {
                Some(conflict) => conflicts.push(conflict),
                None => merged.push(rule.clone()),
            }
        }
    }

    CompositionResult {
        merged_rules: merged,
        conflicts,
        warnings: Vec::new(),
        mode_used: CompositionMode::Base,
    }
}

/// EXTEND: all constitutions are peers; any conflict is fatal.
fn compose_extend(
    constitutions: &[Constitution],
) -> Result<CompositionResult, CompositionConflictError> {
    let mut merged: Vec<String> = Vec::new();
    let mut conflicts = Vec::new();
    let mut sources: HashMap<String, String> = HashMap::new();

    for constitution in constitutions {
        for rule in &constitution.rules {
            let existing_source = sources.get(rule).cloned().unwrap_or_else(|| "unknown".into());
            match detect_conflict(rule, &constitution.id, &merged, &existing_source) {
                Some(conflict) => conflicts.push(conflict),
                None => {
                    merged.push(rule.clone());
                    sources.insert(rule.clone(), constitution.id.clone());
                }
            }
        }
    }

    if conflicts.is_empty() {
        Ok(CompositionResult {
            merged_rules: merged,
            conflicts,
            warnings: Vec::new(),
            mode_used: CompositionMode::Extend,
        })
    } else {
        Err(CompositionConflictError { conflicts })
    }
}

/// OVERRIDE: later rules win; each incoming rule removes conflicting
/// earlier rules, recorded as warnings.
fn compose_override(constitutions: &[Constitution]) -> CompositionResult {
    let mut merged: Vec<String> = Vec::new();
    let mut warnings = Vec::new();

    for constitution in constitutions {
        for rule in &constitution.rules {
            merged.retain(|existing| {
                if rules_conflict(existing, rule) {
                    warnings.push(format!(
                        "rule '{rule}' ({}) overrides '{existing}'",
                        constitution.id
                    ));
                    false
                } else {
                    true
                }
            });
            merged.push(rule.clone());
        }
    }

    if !warnings.is_empty() {
        warn!(overridden = warnings.len(), "override composition removed rules");
    }

    CompositionResult {
        merged_rules: merged,
        conflicts: Vec::new(),
        warnings,
        mode_used: CompositionMode::Override,
    }
}

/// STRICT: duplicates and conflicts are both fatal.
fn compose_strict(
    constitutions: &[Constitution],
) -> Result<CompositionResult, CompositionConflictError> {
    let mut merged: Vec<String> = Vec::new();
    let mut conflicts = Vec::new();
    let mut seen: HashMap<String, String> = HashMap::new();

    for constitution in constitutions {
        for rule in &constitution.rules {
            let normalized = normalize_rule(rule);

            if let Some(source) = seen.get(&normalized) {
                conflicts.push(Conflict {
                    rule_a: rule.clone(),
                    source_a: constitution.id.clone(),
                    rule_b: rule.clone(),
                    source_b: source.clone(),
                    conflict_type: ConflictType::Duplicate,
                });
                continue;
            }

            match detect_conflict(rule, &constitution.id, &merged, "earlier") {
                Some(conflict) => conflicts.push(conflict),
                None => {
                    merged.push(rule.clone());
                    seen.insert(normalized, constitution.id.clone());
                }
            }
        }
    }

    if conflicts.is_empty() {
        Ok(CompositionResult {
            merged_rules: merged,
            conflicts,
            warnings: Vec::new(),
            mode_used: CompositionMode::Strict,
        })
    } else {
        Err(CompositionConflictError { conflicts })
    }
}

fn normalize_rule(rule: &str) -> String {
    rule.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// First conflict between a rule and any already-merged rule.
fn detect_conflict(
    rule: &str,
    source: &str,
    existing: &[String],
    existing_source: &str,
) -> Option<Conflict> {
    existing.iter().find_map(|existing_rule| {
        rules_conflict(rule, existing_rule).then(|| Conflict {
            rule_a: rule.to_string(),
            source_a: source.to_string(),
            rule_b: existing_rule.clone(),
            source_b: existing_source.to_string(),
            conflict_type: classify_conflict(rule, existing_rule),
        })
    })
}

/// Lexical conflict test: keyword-opposite pair plus shared topic.
fn rules_conflict(rule_a: &str, rule_b: &str) -> bool {
    let a = rule_a.to_lowercase();
    let b = rule_b.to_lowercase();

    for (keyword, opposites) in CONFLICT_KEYWORDS {
        if a.contains(keyword) && opposites.iter().any(|opposite| b.contains(opposite)) {
            return same_topic(&a, &b);
        }
    }
    false
}

/// Topic heuristic: at least two shared significant words.
fn same_topic(rule_a: &str, rule_b: &str) -> bool {
    let significant = |rule: &str| -> HashSet<String> {
        rule.split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty() && !STOP_WORDS.contains(&w.as_str()))
            .collect()
    };
    let words_a = significant(rule_a);
    let words_b = significant(rule_b);
    words_a.intersection(&words_b).count() >= 2
}

/// Fixed decision table on the keyword pair.
fn classify_conflict(rule_a: &str, rule_b: &str) -> ConflictType {
    let a = rule_a.to_lowercase();
    let b = rule_b.to_lowercase();

    if (a.contains("always") && b.contains("never")) || (a.contains("never") && b.contains("always"))
    {
        return ConflictType::Contradiction;
    }
    if (a.contains("must not") && b.contains("must") && !b.contains("must not"))
        || (a.contains("must") && !a.contains("must not") && b.contains("must not"))
    {
        return ConflictType::Contradiction;
    }
    if (a.contains("allow") && b.contains("forbid")) || (a.contains("forbid") && b.contains("allow"))
    {
        return ConflictType::Contradiction;
    }
    ConflictType::Tension
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vcp_hooks::{Hook, HookRegistry, HookResult, HookScope};

    fn constitution(id: &str, rules: &[&str]) -> Constitution {
        Constitution::new(id, rules.iter().map(|r| r.to_string()).collect())
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let result = Composer::new().compose(&[], CompositionMode::Extend).unwrap();
        assert!(result.merged_rules.is_empty());
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn base_mode_keeps_base_on_conflict() {
        let result = Composer::new()
            .compose(
                &[
                    constitution("base", &["Always use formal language."]),
                    constitution("later", &["Never use formal language.", "Cite sources."]),
                ],
                CompositionMode::Base,
            )
            .unwrap();
        assert_eq!(
            result.merged_rules,
            vec![
                "Always use formal language.".to_string(),
                "Cite sources.".to_string()
            ]
        );
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::Contradiction);
    }

    #[test]
    fn extend_mode_raises_on_contradiction() {
        let err = Composer::new()
            .compose(
                &[
                    constitution("a", &["Always use formal language."]),
                    constitution("b", &["Never use formal language."]),
                ],
                CompositionMode::Extend,
            )
            .unwrap_err();
        assert_eq!(err.conflicts.len(), 1);
        assert_eq!(err.conflicts[0].conflict_type, ConflictType::Contradiction);
    }

    #[test]
    fn extend_mode_merges_compatible_rules() {
        let result = Composer::new()
            .compose(
                &[
                    constitution("a", &["Always cite sources."]),
                    constitution("b", &["Respond in plain prose."]),
                ],
                CompositionMode::Extend,
            )
            .unwrap();
        assert_eq!(result.merged_rules.len(), 2);
    }

    #[test]
    fn override_mode_later_rule_wins() {
        let result = Composer::new()
            .compose(
                &[
                    constitution("a", &["Always use formal language."]),
                    constitution("b", &["Never use formal language."]),
                ],
                CompositionMode::Override,
            )
            .unwrap();
        assert_eq!(result.merged_rules, vec!["Never use formal language.".to_string()]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn override_is_monotonic_for_unconflicted_rules() {
        let result = Composer::new()
            .compose(
                &[
                    constitution("a", &["Always protect user privacy.", "Cite sources."]),
                    constitution("b", &["Never protect wrongdoers privacy."]),
                ],
                CompositionMode::Override,
            )
            .unwrap();
        // The unrelated rule survives; the overridden one does not reappear
        assert!(result.merged_rules.contains(&"Cite sources.".to_string()));
        assert!(!result
            .merged_rules
            .contains(&"Always protect user privacy.".to_string()));
    }

    #[test]
    fn strict_mode_rejects_duplicates() {
        let err = Composer::new()
            .compose(
                &[
                    constitution("a", &["Be kind."]),
                    constitution("b", &["be  kind."]),
                ],
                CompositionMode::Strict,
            )
            .unwrap_err();
        assert_eq!(err.conflicts[0].conflict_type, ConflictType::Duplicate);
    }

    #[test]
    fn unrelated_opposites_do_not_conflict() {
        // Keyword opposition without shared topic is not a conflict
        let result = Composer::new()
            .compose(
                &[
                    constitution("a", &["Always cite peer-reviewed research."]),
                    constitution("b", &["Never disclose private keys."]),
                ],
                CompositionMode::Extend,
            )
            .unwrap();
        assert_eq!(result.merged_rules.len(), 2);
    }

    #[test]
    fn on_conflict_hook_can_resolve() {
        let registry = Arc::new(HookRegistry::new());
        let resolve: vcp_hooks::types::HookAction = Arc::new(|_| HookResult::Modify {
            context: None,
            constitution: Some(Constitution::new(
                "resolved",
                vec!["Use formal language in legal contexts only.".into()],
            )),
        });
        registry
            .register(
                Hook::new("resolver", HookType::OnConflict, 50, resolve),
                HookScope::Deployment,
            )
            .unwrap();
        let composer =
            Composer::new().with_hook_executor(Arc::new(HookExecutor::new(registry)));

        let result = composer
            .compose(
                &[
                    constitution("a", &["Always use formal language."]),
                    constitution("b", &["Never use formal language."]),
                ],
                CompositionMode::Extend,
            )
            .unwrap();
        assert_eq!(
            result.merged_rules,
            vec!["Use formal language in legal contexts only.".to_string()]
        );
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn on_conflict_hook_without_resolution_reraises() {
        let registry = Arc::new(HookRegistry::new());
        let noop: vcp_hooks::types::HookAction = Arc::new(|_| HookResult::Continue);
        registry
            .register(
                Hook::new("observer", HookType::OnConflict, 50, noop),
                HookScope::Deployment,
            )
            .unwrap();
        let composer =
            Composer::new().with_hook_executor(Arc::new(HookExecutor::new(registry)));

        let err = composer
            .compose(
                &[
                    constitution("a", &["Always use formal language."]),
                    constitution("b", &["Never use formal language."]),
                ],
                CompositionMode::Extend,
            )
            .unwrap_err();
        assert_eq!(err.conflicts.len(), 1);
    }
}
