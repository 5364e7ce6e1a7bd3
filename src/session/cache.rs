//! Session-identity cache: production keys to staging identities.
//!
//! The store maps a production-session identifier to the staging-realm
//! identity learned from staging responses. The distinguished `""` key
//! always maps to an all-empty identity so the forward path never deals
//! with a missing entry. The store is owned by the forwarder task and
//! mutated only there.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header::{HeaderMap, COOKIE, SET_COOKIE};
use cookie::Cookie;

use super::expiry::ExpiryQueue;

/// Identity cookie names, matched case-insensitively.
pub const COOKIE_SESSION_KEY: &str = "sessionKey";
pub const COOKIE_SESSION_TTL: &str = "sessionTtl";
pub const COOKIE_CSRF_TOKEN: &str = "csrfToken";

/// Fallback lifetime for entries whose expiration is unknown.
const FALLBACK_TTL_MS: i64 = 20 * 60 * 1000;

/// Staging identity for one production session. All token fields may
/// independently be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagingIdentity {
    pub session_key: String,
    pub session_ttl: String,
    pub csrf_token: String,
    /// Epoch milliseconds; 0 means not yet known.
    pub expiration: i64,
}

/// A `Set-Cookie` reduced to the fields the cache update needs.
#[derive(Debug, Clone)]
pub struct StagingCookie {
    pub name: String,
    pub value: String,
    pub expires_ms: Option<i64>,
    pub max_age_secs: Option<i64>,
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_ms_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Parse one raw `Set-Cookie` header value.
pub fn parse_set_cookie(raw: &str) -> Option<StagingCookie> {
    let parsed = Cookie::parse(raw).ok()?;
    let expires_ms = parsed
        .expires_datetime()
        .map(|t| (t.unix_timestamp_nanos() / 1_000_000) as i64);
    let max_age_secs = parsed.max_age().map(|d| d.whole_seconds());
    Some(StagingCookie {
        name: parsed.name().to_string(),
        value: parsed.value().to_string(),
        expires_ms,
        max_age_secs,
    })
}

/// All `Set-Cookie` values of a response, parsed.
pub fn response_cookies(headers: &HeaderMap) -> Vec<StagingCookie> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect()
}

/// The new production session key announced by a response, with the
/// expiration of that cookie (0 when absent or unparsable).
pub fn session_key_from_response(headers: &HeaderMap) -> (String, i64) {
    for cookie in response_cookies(headers) {
        if cookie.name.eq_ignore_ascii_case(COOKIE_SESSION_KEY) {
            return (cookie.value, cookie.expires_ms.unwrap_or(0));
        }
    }
    (String::new(), 0)
}

/// Name/value pairs from the request `Cookie` header(s).
pub fn request_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()).filter_map(Result::ok))
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

/// The production session key carried by an inbound request, or "".
pub fn session_key_from_request(headers: &HeaderMap) -> String {
    request_cookies(headers)
        .into_iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(COOKIE_SESSION_KEY))
        .map(|(_, value)| value)
        .unwrap_or_default()
}

/// The session-identity cache plus its expiration heap.
#[derive(Debug)]
pub struct SessionStore {
    cache: HashMap<String, StagingIdentity>,
    expiry: ExpiryQueue,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let mut cache = HashMap::new();
        // "no known identity" sentinel, keeps the forward path null-free
        cache.insert(String::new(), StagingIdentity::default());
        Self {
            cache,
            expiry: ExpiryQueue::new(),
        }
    }

    /// Identity for a production key; the empty sentinel when unknown.
    pub fn identity_for(&self, key: &str) -> &StagingIdentity {
        self.cache
            .get(key)
            .unwrap_or_else(|| &self.cache[""])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Number of cached identities, excluding the sentinel.
    pub fn len(&self) -> usize {
        self.cache.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn heap_len(&self) -> usize {
        self.expiry.len()
    }

    /// Record a staging response for `prod_key` (the production session
    /// key learned from the production response at intercept time).
    ///
    /// Rules, in order: error responses and unknown keys are ignored;
    /// identity cookies update the entry; the intercept-time expiration
    /// wins over the stored one, with a 20-minute fallback when neither
    /// is known; an empty staging session key with no live expiration is
    /// a logout and deletes the entry; new entries also join the
    /// expiration heap.
    pub fn record_response(
        &mut self,
        prod_key: &str,
        status: u16,
        cookies: &[StagingCookie],
        prod_key_expiration: i64,
        now_ms: i64,
    ) {
        if prod_key.is_empty() || status >= 400 {
            return;
        }

        let (mut entry, is_new) = match self.cache.get(prod_key) {
            Some(existing) => (existing.clone(), false),
            None => (StagingIdentity::default(), true),
        };

        let mut staging_expires: Option<i64> = None;
        let mut staging_max_age: Option<i64> = None;
        for cookie in cookies {
            if cookie.name.eq_ignore_ascii_case(COOKIE_CSRF_TOKEN) {
                entry.csrf_token = cookie.value.clone();
            } else if cookie.name.eq_ignore_ascii_case(COOKIE_SESSION_KEY) {
                entry.session_key = cookie.value.clone();
                staging_expires = cookie.expires_ms;
                staging_max_age = cookie.max_age_secs;
            } else if cookie.name.eq_ignore_ascii_case(COOKIE_SESSION_TTL) {
                entry.session_ttl = cookie.value.clone();
            }
        }

        if prod_key_expiration != 0 && entry.expiration != prod_key_expiration {
            entry.expiration = prod_key_expiration;
        } else if entry.expiration == 0 {
            entry.expiration = now_ms + FALLBACK_TTL_MS;
        }

        // logout: no staging key and nothing keeping the session alive
        let alive = staging_expires.map_or(false, |t| t > now_ms)
            || staging_max_age.map_or(false, |secs| secs > 0);
        if entry.session_key.is_empty() && !alive {
            tracing::debug!(key = %prod_key, "staging logout, dropping cached identity");
            self.cache.remove(prod_key);
            return;
        }

        self.cache.insert(prod_key.to_string(), entry);
        if is_new {
            self.insert_expiry(prod_key, prod_key_expiration, now_ms);
        }
    }

    /// Put a new key onto the expiration heap, reusing the root slot
    /// when it holds an expired or abandoned token.
    fn insert_expiry(&mut self, key: &str, expiration: i64, now_ms: i64) {
        let (root_token, root_time) = match self.expiry.root() {
            None => {
                self.expiry.push(key.to_string(), expiration);
                return;
            }
            Some(root) => (root.token.clone(), root.time_ms),
        };

        if root_token == key {
            self.expiry.update(0, key.to_string(), expiration);
            return;
        }

        if root_time <= now_ms {
            let cached_expiration = self.cache.get(&root_token).map(|e| e.expiration);
            match cached_expiration {
                Some(current) if current > now_ms => {
                    // the root's token is still live; put the root back
                    // in its right place and add the new element
                    self.expiry.update(0, root_token, current);
                }
                _ => {
                    // expired or gone, reuse the slot
                    self.expiry.update(0, key.to_string(), expiration);
                    return;
                }
            }
        }

        self.expiry.push(key.to_string(), expiration);
    }
}
