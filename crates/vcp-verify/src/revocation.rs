//! Revocation checking via online endpoint or CRL
//!
//! Tries the manifest's `check_uri` (per-jti online status) first and
//! falls back to `crl_uri` (list). Both paths run the SSRF guard before
//! any network I/O, cap response size, and cache results against a
//! monotonic clock. Transport and parse failures are logged and
//! reported as "not revoked" — the only fail-open rule in the pipeline —
//! while an actual revocation entry is always authoritative.

use std::collections::HashMap;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;
use url::Url;
use vcp_core::constants::MAX_REVOCATION_RESPONSE_BYTES;
use vcp_core::types::parse_utc;
use vcp_core::Manifest;

/// Result of a revocation check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationStatus {
    pub revoked: bool,
    pub reason: Option<String>,
    pub revoked_at: Option<String>,
}

/// Errors internal to a single lookup; never escape `check`.
#[derive(Debug, thiserror::Error)]
pub enum RevocationError {
    /// URI rejected by the SSRF guard
    #[error("SSRF protection: {0}")]
    Ssrf(String),

    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Response exceeded the size cap
    #[error("response exceeds limit of {limit} bytes")]
    TooLarge {
        /// The configured cap
        limit: usize,
    },

    /// Body was not the expected JSON
    #[error("invalid JSON response: {0}")]
    Parse(String),
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct CrlEntry {
    reason: Option<String>,
    revoked_at: Option<String>,
}

/// Check bundle revocation status with caching and SSRF protection.
pub struct RevocationChecker {
    client: reqwest::blocking::Client,
    cache: Mutex<HashMap<String, CacheEntry<RevocationStatus>>>,
    crl_cache: Mutex<HashMap<String, CacheEntry<HashMap<String, CrlEntry>>>>,
    cache_ttl: Duration,
    allowed_ports: Vec<u16>,
}

impl RevocationChecker {
    /// Create a checker with a 300 s cache TTL and 10 s request timeout.
    pub fn new() -> Self {
        Self::with_config(Duration::from_secs(300), Duration::from_secs(10), Vec::new())
    }

    /// Create a checker with explicit cache TTL, request timeout, and
    /// additional allowed ports beyond 80/443.
    pub fn with_config(
        cache_ttl: Duration,
        timeout: Duration,
        allowed_ports: Vec<u16>,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                let original_host = attempt
                    .previous()
                    .first()
                    .and_then(Url::host_str)
                    .map(str::to_string);
                let new_host = attempt.url().host_str().map(str::to_string);
                if attempt.previous().len() > 5 {
                    attempt.error("too many redirects")
                } else if original_host != new_host {
                    attempt.error("redirect changed host")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            cache: Mutex::new(HashMap::new()),
            crl_cache: Mutex::new(HashMap::new()),
            cache_ttl,
            allowed_ports,
        }
    }

    /// Check whether a bundle is revoked.
    ///
    /// Never fails: every internal error degrades to "not revoked" with
    /// a warning, per the protocol's fail-open rule for this check.
    pub fn check(&self, manifest: &Manifest) -> RevocationStatus {
        let jti = &manifest.timestamps.jti;
        let Some(revocation) = &manifest.revocation else {
            warn!(jti = %jti, "no revocation URIs configured; treating as not revoked");
            return RevocationStatus::default();
        };

        if let Some(check_uri) = &revocation.check_uri {
            match self.check_online(check_uri, jti) {
                Ok(status) => return status,
                Err(err) => warn!(jti = %jti, error = %err, "online revocation check failed"),
            }
        }

        if let Some(crl_uri) = &revocation.crl_uri {
            match self.check_crl(crl_uri, jti) {
                Ok(status) => return status,
                Err(err) => warn!(jti = %jti, error = %err, "CRL revocation check failed"),
            }
        }

        if revocation.check_uri.is_none() && revocation.crl_uri.is_none() {
            warn!(jti = %jti, "no revocation URIs in manifest; treating as not revoked");
        } else {
            warn!(jti = %jti, "all revocation checks failed; treating as not revoked");
        }
        RevocationStatus::default()
    }

    /// Drop all cached lookups.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        self.crl_cache.lock().clear();
    }

    fn check_online(&self, uri: &str, jti: &str) -> Result<RevocationStatus, RevocationError> {
        let cache_key = format!("online:{uri}:{jti}");
        if let Some(cached) = Self::cached(&self.cache, &cache_key) {
            return Ok(cached);
        }

        validate_uri(uri, &self.allowed_ports)?;

        let separator = if uri.contains('?') { '&' } else { '?' };
        let full_uri = format!("{uri}{separator}jti={jti}");
        let data = self.fetch_json(&full_uri)?;

        let status = RevocationStatus {
            revoked: data.get("revoked").and_then(Value::as_bool).unwrap_or(false),
            reason: data.get("reason").and_then(Value::as_str).map(str::to_string),
            revoked_at: data
                .get("revoked_at")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        self.cache.lock().insert(
            cache_key,
            CacheEntry {
                value: status.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
        Ok(status)
    }

    fn check_crl(&self, uri: &str, jti: &str) -> Result<RevocationStatus, RevocationError> {
        let cache_key = format!("crl:{uri}");
        let revoked_map = match Self::cached(&self.crl_cache, &cache_key) {
            Some(map) => map,
            None => {
                validate_uri(uri, &self.allowed_ports)?;
                let data = self.fetch_json(uri)?;
                let map = parse_crl(uri, &data);
                self.crl_cache.lock().insert(
                    cache_key,
                    CacheEntry {
                        value: map.clone(),
                        expires_at: Instant::now() + self.cache_ttl,
                    },
                );
                map
            }
        };

        Ok(match revoked_map.get(jti) {
            Some(entry) => RevocationStatus {
                revoked: true,
                reason: entry.reason.clone(),
                revoked_at: entry.revoked_at.clone(),
            },
            None => RevocationStatus::default(),
        })
    }

    fn fetch_json(&self, uri: &str) -> Result<Value, RevocationError> {
        let response = self
            .client
            .get(uri)
            .header("Accept", "application/json")
            .header("User-Agent", "vcp/0.1")
            .send()
            .map_err(|e| RevocationError::Http(e.to_string()))?;

        if let Some(length) = response.content_length() {
            if length as usize > MAX_REVOCATION_RESPONSE_BYTES {
                return Err(RevocationError::TooLarge {
                    limit: MAX_REVOCATION_RESPONSE_BYTES,
                });
            }
        }

        // Counting reader: Content-Length may be absent or lying
        let mut body = Vec::new();
        response
            .take((MAX_REVOCATION_RESPONSE_BYTES + 1) as u64)
            .read_to_end(&mut body)
            .map_err(|e| RevocationError::Http(e.to_string()))?;
        if body.len() > MAX_REVOCATION_RESPONSE_BYTES {
            return Err(RevocationError::TooLarge {
                limit: MAX_REVOCATION_RESPONSE_BYTES,
            });
        }

        serde_json::from_slice(&body).map_err(|e| RevocationError::Parse(e.to_string()))
    }

    fn cached<T: Clone>(
        cache: &Mutex<HashMap<String, CacheEntry<T>>>,
        key: &str,
    ) -> Option<T> {
        let mut cache = cache.lock();
        match cache.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }
}

impl Default for RevocationChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a CRL body into a per-jti lookup map, recording staleness.
///
/// A CRL past its `next_update` is still authoritative; the event is
/// only logged.
fn parse_crl(uri: &str, data: &Value) -> HashMap<String, CrlEntry> {
    if let Some(next_update) = data.get("next_update").and_then(Value::as_str) {
        if let Ok(next) = parse_utc(next_update) {
            if next < chrono::Utc::now() {
                warn!(
                    uri,
                    next_update, "CRL is stale; treating entries as authoritative but stale"
                );
            }
        }
    }

    let mut map = HashMap::new();
    if let Some(entries) = data.get("revoked").and_then(Value::as_array) {
        for entry in entries {
            let Some(jti) = entry.get("jti").and_then(Value::as_str) else {
                continue;
            };
            map.insert(
                jti.to_string(),
                CrlEntry {
                    reason: entry.get("reason").and_then(Value::as_str).map(str::to_string),
                    revoked_at: entry
                        .get("revoked_at")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                },
            );
        }
    }
    map
}

/// Validate a URI for SSRF safety before any network I/O.
///
/// Rejects non-HTTP(S) schemes, missing hostnames, ports outside
/// 80/443 plus the allow-list, unresolvable hostnames, and any URI for
/// which *any* resolved address falls in a private or reserved range.
///
/// # Errors
///
/// Returns [`RevocationError::Ssrf`] with the rejection reason.
pub fn validate_uri(uri: &str, allowed_ports: &[u16]) -> Result<(), RevocationError> {
    let parsed =
        Url::parse(uri).map_err(|e| RevocationError::Ssrf(format!("unparseable URI: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(RevocationError::Ssrf(format!(
                "rejected scheme '{other}' (only http/https allowed)"
            )))
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| RevocationError::Ssrf("no hostname in URI".to_string()))?;

    if let Some(port) = parsed.port() {
        if port != 80 && port != 443 && !allowed_ports.contains(&port) {
            return Err(RevocationError::Ssrf(format!(
                "non-standard port {port} not in allowed set"
            )));
        }
    }

    let port = parsed.port().unwrap_or(443);
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| RevocationError::Ssrf(format!("DNS resolution failed for '{host}': {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(RevocationError::Ssrf(format!(
            "no addresses resolved for '{host}'"
        )));
    }

    for addr in addrs {
        if is_private_ip(addr.ip()) {
            return Err(RevocationError::Ssrf(format!(
                "resolved IP {} is in a private/reserved range",
                addr.ip()
            )));
        }
    }
    Ok(())
}

/// Whether an IP falls in a private, loopback, link-local, or otherwise
/// reserved range.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    match o[0] {
        0 | 10 | 127 => true,                         // "this", private A, loopback
        100 if (64..=127).contains(&o[1]) => true,    // CGNAT
        169 if o[1] == 254 => true,                   // link-local
        172 if (16..=31).contains(&o[1]) => true,     // private B
        192 if o[1] == 168 => true,                   // private C
        192 if o[1] == 0 && o[2] == 0 => true,        // IETF protocol assignments
        198 if o[1] == 18 || o[1] == 19 => true,      // benchmark testing
        224..=255 => true,                            // multicast, reserved, broadcast
        _ => false,
    }
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let segments = ip.segments();
    ip.is_loopback()
        || ip.is_unspecified()
        || (segments[0] & 0xffc0) == 0xfe80 // link-local
        || (segments[0] & 0xfe00) == 0xfc00 // unique local
        || (segments[0] & 0xff00) == 0xff00 // multicast
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes_restricted() {
        assert!(validate_uri("ftp://example.com/crl", &[]).is_err());
        assert!(validate_uri("file:///etc/passwd", &[]).is_err());
        assert!(validate_uri("gopher://example.com/", &[]).is_err());
    }

    #[test]
    fn loopback_and_private_literals_rejected() {
        for uri in [
            "http://127.0.0.1/check",
            "http://10.0.0.5/check",
            "https://192.168.1.1/check",
            "http://169.254.169.254/latest/meta-data",
            "http://100.64.0.1/check",
            "http://[::1]/check",
            "http://[fe80::1]/check",
            "http://[::ffff:127.0.0.1]/check",
        ] {
            assert!(validate_uri(uri, &[]).is_err(), "{uri} should be rejected");
        }
    }

    #[test]
    fn non_standard_ports_need_allowlist() {
        assert!(validate_uri("http://93.184.216.34:8080/check", &[]).is_err());
        assert!(validate_uri("http://93.184.216.34:8080/check", &[8080]).is_ok());
        assert!(validate_uri("https://93.184.216.34:443/check", &[]).is_ok());
    }

    #[test]
    fn public_literal_accepted() {
        assert!(validate_uri("https://93.184.216.34/check", &[]).is_ok());
    }

    #[test]
    fn private_range_classification() {
        assert!(is_private_v4(Ipv4Addr::new(172, 16, 0, 1)));
        assert!(is_private_v4(Ipv4Addr::new(172, 31, 255, 255)));
        assert!(!is_private_v4(Ipv4Addr::new(172, 32, 0, 1)));
        assert!(is_private_v4(Ipv4Addr::new(198, 18, 0, 1)));
        assert!(!is_private_v4(Ipv4Addr::new(198, 20, 0, 1)));
        assert!(is_private_v4(Ipv4Addr::new(224, 0, 0, 1)));
        assert!(is_private_v4(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(is_private_v6("fc00::1".parse().unwrap()));
        assert!(is_private_v6("ff02::1".parse().unwrap()));
        assert!(!is_private_v6("2606:4700::1111".parse().unwrap()));
    }

    #[test]
    fn crl_parse_builds_lookup() {
        let data = serde_json::json!({
            "issuer": "creed.space",
            "updated_at": "2026-01-01T00:00:00Z",
            "next_update": "2099-01-01T00:00:00Z",
            "revoked": [
                {"jti": "a-1", "revoked_at": "2026-01-02T00:00:00Z", "reason": "key compromise"},
                {"revoked_at": "2026-01-02T00:00:00Z"},
                {"jti": "b-2"},
            ],
        });
        let map = parse_crl("https://example.com/crl", &data);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a-1"].reason.as_deref(), Some("key compromise"));
        assert!(map["b-2"].reason.is_none());
    }

    #[test]
    fn missing_revocation_pointers_fail_open() {
        let checker = RevocationChecker::new();
        let json = serde_json::json!({
            "vcp_version": "1.0",
            "bundle": {"id": "creed://x/y", "version": "1.0.0", "content_hash": "sha256:00"},
            "issuer": {"id": "x", "public_key": "ed25519:AA", "key_id": "k"},
            "timestamps": {
                "iat": "2026-01-10T12:00:00Z", "nbf": "2026-01-10T12:00:00Z",
                "exp": "2026-01-17T12:00:00Z", "jti": "550e8400-e29b-41d4-a716-446655440000"
            },
            "budget": {"token_count": 1, "tokenizer": "cl100k_base", "max_context_share": 0.25},
            "safety_attestation": {
                "auditor": "a", "auditor_key_id": "ak",
                "reviewed_at": "2026-01-10T11:00:00Z",
                "attestation_type": "injection-safe", "signature": "base64:AA"
            },
            "signature": {"algorithm": "ed25519", "value": "base64:AA", "signed_fields": []},
        });
        let manifest = Manifest::from_value(&json).unwrap();
        let status = checker.check(&manifest);
        assert!(!status.revoked);
    }
}
