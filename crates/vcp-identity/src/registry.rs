//! Privacy-preserving local registry
//!
//! Reference registry over two structures: a prefix tree whose nodes
//! inherit the strictest privacy tier of any descendant entry, and a
//! Bloom filter for enumeration-free existence checks.
//!
//! Query privacy rules:
//! - exact `resolve` is always allowed and reveals nothing about siblings
//! - prefix/pattern queries over non-public tiers require authorization
//!   for the queried prefix; unauthorized matches are counted into
//!   `redacted_count` rather than returned
//! - `exists` goes through the Bloom filter, so a negative answer never
//!   touches the entry table

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::token::Token;

/// Privacy tier for registry entries, ordered by strictness ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrivacyTier {
    /// Anyone can discover and enumerate
    Public,
    /// Existence public, details require org membership
    Organizational,
    /// Community-moderated access
    Community,
    /// Owner-only enumeration
    Personal,
    /// Hash-based identity, unlinkable
    Pseudonymous,
}

impl PrivacyTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Organizational => "organizational",
            Self::Community => "community",
            Self::Personal => "personal",
            Self::Pseudonymous => "pseudonymous",
        }
    }
}

/// Infer the privacy tier from a token's first segment.
pub fn infer_privacy_tier(token: &Token) -> PrivacyTier {
    match token.domain() {
        "family" | "work" | "secure" | "creative" | "reality" | "education" | "health" => {
            PrivacyTier::Public
        }
        "company" | "school" | "ngo" | "org" => PrivacyTier::Organizational,
        "religion" | "culture" | "community" => PrivacyTier::Community,
        "user" => PrivacyTier::Personal,
        "anon" | "pseudo" => PrivacyTier::Pseudonymous,
        _ => PrivacyTier::Organizational,
    }
}

/// A registered token with metadata.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub token: Token,
    pub privacy_tier: PrivacyTier,
    pub owner_id: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Authorization context for registry queries.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationContext {
    pub requester_id: Option<String>,
    /// Organization names the requester belongs to (e.g. "acme")
    pub org_memberships: HashSet<String>,
    pub community_memberships: HashSet<String>,
    /// Canonical prefixes the requester owns (e.g. "user.alice")
    pub owned_prefixes: HashSet<String>,
    pub is_admin: bool,
}

impl AuthorizationContext {
    pub fn admin() -> Self {
        Self {
            is_admin: true,
            ..Self::default()
        }
    }
}

/// Result of a registry query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub tokens: Vec<Token>,
    /// Visible plus redacted matches
    pub total_count: usize,
    pub has_more: bool,
    /// False when any match was redacted for lack of authorization
    pub scope_authorized: bool,
    pub redacted_count: usize,
}

/// Subscription callback: `(token, event)` where event is "created".
pub type SubscriptionCallback = Arc<dyn Fn(&Token, &str) + Send + Sync>;

/// Space-efficient probabilistic membership: proves "definitely not
/// present" without permitting enumeration.
struct BloomFilter {
    bits: Vec<u8>,
    size: usize,
    num_hashes: usize,
}

impl BloomFilter {
    fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let n = expected_items.max(1) as f64;
        let size = (-(n * false_positive_rate.ln()) / (2f64.ln().powi(2))).ceil() as usize;
        let size = size.max(8);
        let num_hashes = ((size as f64 / n) * 2f64.ln()).round().max(1.0) as usize;
        Self {
            bits: vec![0u8; size / 8 + 1],
            size,
            num_hashes,
        }
    }

    fn positions(&self, item: &str) -> Vec<usize> {
        // Double hashing over two domain-separated SHA-256 digests
        let h1 = Self::digest_prefix(b"vcp-bloom-1:", item);
        let h2 = Self::digest_prefix(b"vcp-bloom-2:", item);
        (0..self.num_hashes)
            .map(|i| ((h1.wrapping_add((i as u64).wrapping_mul(h2))) % self.size as u64) as usize)
            .collect()
    }

    fn digest_prefix(prefix: &[u8], item: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(prefix);
        hasher.update(item.as_bytes());
        let digest = hasher.finalize();
        u64::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ])
    }

    fn add(&mut self, item: &str) {
        for pos in self.positions(item) {
            self.bits[pos / 8] |= 1 << (pos % 8);
        }
    }

    fn might_contain(&self, item: &str) -> bool {
        self.positions(item)
            .into_iter()
            .all(|pos| self.bits[pos / 8] & (1 << (pos % 8)) != 0)
    }
}

/// Prefix-tree node held in an arena with stable indices.
struct Node {
    children: HashMap<String, usize>,
    /// Canonical keys of entries terminating at this node
    entry_keys: Vec<String>,
    /// Strictest tier of any descendant entry
    privacy_tier: PrivacyTier,
}

impl Node {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            entry_keys: Vec::new(),
            privacy_tier: PrivacyTier::Public,
        }
    }
}

struct Subscription {
    pattern: String,
    auth: AuthorizationContext,
    callback: SubscriptionCallback,
}

struct RegistryInner {
    nodes: Vec<Node>,
    entries: HashMap<String, RegistryEntry>,
    bloom: BloomFilter,
    subscriptions: HashMap<String, Subscription>,
}

impl RegistryInner {
    const ROOT: usize = 0;

    fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            entries: HashMap::new(),
            bloom: BloomFilter::new(10_000, 0.01),
            subscriptions: HashMap::new(),
        }
    }

    fn insert(&mut self, entry: &RegistryEntry) {
        let canonical = entry.token.canonical();
        let mut node = Self::ROOT;
        for segment in entry.token.segments() {
            let next = match self.nodes[node].children.get(segment) {
                Some(index) => *index,
                None => {
                    let index = self.nodes.len();
                    self.nodes.push(Node::new());
                    self.nodes[node].children.insert(segment.clone(), index);
                    index
                }
            };
            node = next;
            if entry.privacy_tier > self.nodes[node].privacy_tier {
                self.nodes[node].privacy_tier = entry.privacy_tier;
            }
        }
        self.nodes[node].entry_keys.push(canonical);
    }

    fn node_at(&self, segments: &[String]) -> Option<usize> {
        let mut node = Self::ROOT;
        for segment in segments {
            node = *self.nodes[node].children.get(segment)?;
        }
        Some(node)
    }

    fn count_entries(&self, node: usize) -> usize {
        let mut count = self.nodes[node].entry_keys.len();
        for child in self.nodes[node].children.values() {
            count += self.count_entries(*child);
        }
        count
    }

    fn collect_entries(
        &self,
        node: usize,
        auth: &AuthorizationContext,
        max_results: usize,
        collected: &mut Vec<Token>,
        redacted: &mut usize,
    ) {
        for key in &self.nodes[node].entry_keys {
            if collected.len() >= max_results {
                return;
            }
            if let Some(entry) = self.entries.get(key) {
                if can_access_entry(entry, auth) {
                    collected.push(entry.token.clone());
                } else {
                    *redacted += 1;
                }
            }
        }
        for child in self.nodes[node].children.values() {
            if collected.len() >= max_results {
                return;
            }
            self.collect_entries(*child, auth, max_results, collected, redacted);
        }
    }

    /// Prefix query with authorization at the prefix node.
    fn find_prefix(
        &self,
        prefix: &[String],
        auth: &AuthorizationContext,
        max_results: usize,
    ) -> (Vec<Token>, usize) {
        let Some(node) = self.node_at(prefix) else {
            return (Vec::new(), 0);
        };

        let prefix_str = prefix.join(".");
        if !can_enumerate(self.nodes[node].privacy_tier, &prefix_str, auth) {
            return (Vec::new(), self.count_entries(node));
        }

        let mut collected = Vec::new();
        let mut redacted = 0;
        self.collect_entries(node, auth, max_results, &mut collected, &mut redacted);
        (collected, redacted)
    }

    /// Whether the subscription's auth may observe the given pattern.
    fn subscription_authorized(&self, pattern: &str, auth: &AuthorizationContext) -> bool {
        let prefix = pattern
            .split(['*'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('.');
        let segments: Vec<String> = if prefix.is_empty() {
            Vec::new()
        } else {
            prefix.split('.').map(str::to_string).collect()
        };

        // Walk as deep as the tree goes along the prefix
        let mut node = Self::ROOT;
        for segment in &segments {
            match self.nodes[node].children.get(segment) {
                Some(next) => node = *next,
                None => break,
            }
        }
        can_enumerate(self.nodes[node].privacy_tier, &segments.join("."), auth)
    }
}

/// Whether the requester can enumerate under a prefix of a given tier.
fn can_enumerate(tier: PrivacyTier, prefix: &str, auth: &AuthorizationContext) -> bool {
    if auth.is_admin {
        return true;
    }
    match tier {
        PrivacyTier::Public => true,
        PrivacyTier::Organizational => {
            let parts: Vec<&str> = prefix.split('.').collect();
            parts.len() >= 2
                && matches!(parts[0], "company" | "school" | "ngo" | "org")
                && auth.org_memberships.contains(parts[1])
        }
        PrivacyTier::Community => {
            let parts: Vec<&str> = prefix.split('.').collect();
            parts.len() >= 2
                && matches!(parts[0], "religion" | "culture" | "community")
                && auth.community_memberships.contains(parts[1])
        }
        PrivacyTier::Personal | PrivacyTier::Pseudonymous => {
            auth.owned_prefixes.contains(prefix)
        }
    }
}

/// Whether the requester can see an individual entry.
fn can_access_entry(entry: &RegistryEntry, auth: &AuthorizationContext) -> bool {
    if entry.privacy_tier == PrivacyTier::Public || auth.is_admin {
        return true;
    }
    if let (Some(owner), Some(requester)) = (&entry.owner_id, &auth.requester_id) {
        if owner == requester {
            return true;
        }
    }

    let segments = entry.token.segments();
    match entry.privacy_tier {
        PrivacyTier::Organizational => {
            segments.len() >= 2
                && matches!(
                    segments[0].as_str(),
                    "company" | "school" | "ngo" | "org"
                )
                && auth.org_memberships.contains(&segments[1])
        }
        PrivacyTier::Community => {
            segments.len() >= 2
                && matches!(segments[0].as_str(), "religion" | "culture" | "community")
                && auth.community_memberships.contains(&segments[1])
        }
        PrivacyTier::Personal | PrivacyTier::Pseudonymous => {
            let canonical = entry.token.canonical();
            auth.owned_prefixes
                .iter()
                .any(|prefix| canonical.starts_with(prefix.as_str()))
        }
        PrivacyTier::Public => true,
    }
}

/// In-memory registry for development and testing. Production would
/// back the same interface with a persistent store.
pub struct LocalRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for LocalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::new()),
        }
    }

    /// Register a token, update the Bloom filter, and notify matching
    /// authorized subscribers.
    pub fn register(
        &self,
        token: Token,
        privacy_tier: PrivacyTier,
        owner_id: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> RegistryEntry {
        let entry = RegistryEntry {
            token: token.clone(),
            privacy_tier,
            owner_id,
            metadata: metadata.unwrap_or_default(),
        };

        let callbacks: Vec<SubscriptionCallback> = {
            let mut inner = self.inner.lock();
            inner.insert(&entry);
            inner.bloom.add(&token.canonical());
            inner.entries.insert(token.canonical(), entry.clone());

            inner
                .subscriptions
                .values()
                .filter(|sub| token.matches_pattern(&sub.pattern))
                .filter(|sub| inner.subscription_authorized(&sub.pattern, &sub.auth))
                .map(|sub| sub.callback.clone())
                .collect()
        };

        // Callbacks run outside the lock; their panics never break the
        // registry.
        for callback in callbacks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&token, "created");
            }));
            if result.is_err() {
                warn!(token = %token, "registry subscription callback panicked");
            }
        }

        entry
    }

    /// Exact lookup; always allowed, reveals nothing about siblings.
    pub fn resolve(&self, token: &Token) -> Option<RegistryEntry> {
        self.inner.lock().entries.get(&token.canonical()).cloned()
    }

    /// Existence check through the Bloom filter; a "maybe" is confirmed
    /// against the entry table.
    pub fn exists(&self, token: &Token) -> bool {
        let inner = self.inner.lock();
        let canonical = token.canonical();
        inner.bloom.might_contain(&canonical) && inner.entries.contains_key(&canonical)
    }

    /// Find tokens matching a pattern within the authorized scope.
    ///
    /// Patterns: `company.acme.**` (prefix), `**.compliance` (suffix),
    /// `*.*.legal.*` (per-segment), or an exact token.
    pub fn find(
        &self,
        pattern: &str,
        auth: &AuthorizationContext,
        max_results: usize,
    ) -> QueryResult {
        let inner = self.inner.lock();
        let mut tokens: Vec<Token> = Vec::new();
        let mut redacted = 0usize;

        if pattern.contains("**") {
            if let Some(prefix) = pattern.strip_suffix(".**") {
                let segments: Vec<String> = prefix.split('.').map(str::to_string).collect();
                let (found, prefix_redacted) = inner.find_prefix(&segments, auth, max_results);
                tokens = found;
                redacted += prefix_redacted;
            } else if let Some(suffix) = pattern.strip_prefix("**.") {
                for entry in inner.entries.values() {
                    if !can_access_entry(entry, auth) {
                        if entry.token.canonical().ends_with(suffix) {
                            redacted += 1;
                        }
                        continue;
                    }
                    if entry.token.canonical().ends_with(suffix) && tokens.len() < max_results {
                        tokens.push(entry.token.clone());
                    }
                }
            } else {
                // Mixed pattern: prefix '**' suffix
                let mut parts = pattern.splitn(2, "**");
                let prefix = parts.next().unwrap_or_default().trim_end_matches('.');
                let suffix = parts.next().unwrap_or_default().trim_start_matches('.');
                let segments: Vec<String> = if prefix.is_empty() {
                    Vec::new()
                } else {
                    prefix.split('.').map(str::to_string).collect()
                };
                let (found, prefix_redacted) =
                    inner.find_prefix(&segments, auth, max_results * 2);
                redacted += prefix_redacted;
                for token in found {
                    if !suffix.is_empty() && !token.canonical().ends_with(suffix) {
                        continue;
                    }
                    if tokens.len() >= max_results {
                        break;
                    }
                    tokens.push(token);
                }
            }
        } else if pattern.contains('*') {
            for entry in inner.entries.values() {
                if !entry.token.matches_pattern(pattern) {
                    continue;
                }
                if !can_access_entry(entry, auth) {
                    redacted += 1;
                    continue;
                }
                if tokens.len() < max_results {
                    tokens.push(entry.token.clone());
                }
            }
        } else if let Ok(token) = Token::parse(pattern) {
            if let Some(entry) = inner.entries.get(&token.canonical()) {
                tokens.push(entry.token.clone());
            }
        }

        QueryResult {
            total_count: tokens.len() + redacted,
            has_more: tokens.len() >= max_results,
            scope_authorized: redacted == 0,
            redacted_count: redacted,
            tokens,
        }
    }

    /// Subscribe to registrations matching a pattern. Notifications
    /// honor the same authorization rules as `find`.
    pub fn subscribe(
        &self,
        pattern: impl Into<String>,
        auth: AuthorizationContext,
        callback: SubscriptionCallback,
    ) -> String {
        let mut id_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id_bytes);
        let id = hex::encode(id_bytes);

        self.inner.lock().subscriptions.insert(
            id.clone(),
            Subscription {
                pattern: pattern.into(),
                auth,
                callback,
            },
        );
        id
    }

    /// Remove a subscription. Returns true if it existed.
    pub fn unsubscribe(&self, subscription_id: &str) -> bool {
        self.inner.lock().subscriptions.remove(subscription_id).is_some()
    }
}
