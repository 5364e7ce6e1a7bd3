//! Request mutation ("morf") hooks for fuzz-style negative testing.
//!
//! Both mutators flip exactly one byte to a uniformly random byte in
//! [0,255] — non-printable and control bytes are intentional. Mutation
//! happens before the production send and before the duplicate capture,
//! so both upstreams receive the same perturbed request.

use axum::http::header::HeaderMap;
use axum::http::HeaderValue;
use rand::Rng;

/// Default path prefix under which URI mutation applies.
pub const DEFAULT_MORF_URI_BASE: &str = "/api/";

/// Mutation switches, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct MorfOptions {
    pub morf_uri: bool,
    pub morf_header: bool,
    pub morf_uri_base: String,
}

impl MorfOptions {
    pub fn from_config(config: &crate::config::SplitterConfig) -> Self {
        Self {
            morf_uri: config.morf_uri,
            morf_header: config.morf_header,
            morf_uri_base: config.morf_uri_base.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.morf_uri || self.morf_header
    }
}

/// Mutate one byte of the path suffix beyond `base`.
///
/// Paths that do not start with `base`, or that have nothing beyond it,
/// are left untouched. A mutated byte that is not valid UTF-8 in place is
/// carried as its percent-encoding, which is how it would travel on the
/// wire anyway.
pub fn morf_path(path: &str, base: &str, rng: &mut impl Rng) -> Option<String> {
    if path.len() <= base.len() || !path.as_bytes().starts_with(base.as_bytes()) {
        return None;
    }

    let suffix_len = path.len() - base.len();
    let at = base.len() + rng.gen_range(0..suffix_len);
    let byte: u8 = rng.gen();

    let mut bytes = path.as_bytes().to_vec();
    bytes[at] = byte;

    match String::from_utf8(bytes) {
        Ok(mutated) => Some(mutated),
        // Request paths are ASCII on the wire, so a UTF-8 failure can
        // only come from the byte just written.
        Err(_) => Some(format!("{}%{:02X}{}", &path[..at], byte, &path[at + 1..])),
    }
}

/// Mutate one byte of one value of one randomly chosen header.
///
/// All sibling values of the chosen header are preserved. A mutation that
/// produces an illegal header byte (NUL, CR, LF) keeps the original value
/// for that position; the draw was still uniform.
pub fn morf_header(headers: &mut HeaderMap, rng: &mut impl Rng) {
    if headers.keys_len() == 0 {
        return;
    }

    let target = rng.gen_range(0..headers.keys_len());
    let name = match headers.keys().nth(target) {
        Some(name) => name.clone(),
        None => return,
    };

    let values: Vec<HeaderValue> = headers.get_all(&name).iter().cloned().collect();
    if values.is_empty() {
        return;
    }
    let value_at = rng.gen_range(0..values.len());

    let mut rebuilt: Vec<HeaderValue> = Vec::with_capacity(values.len());
    for (i, value) in values.into_iter().enumerate() {
        if i != value_at || value.is_empty() {
            rebuilt.push(value);
            continue;
        }

        let mut bytes = value.as_bytes().to_vec();
        let at = rng.gen_range(0..bytes.len());
        bytes[at] = rng.gen();

        match HeaderValue::from_bytes(&bytes) {
            Ok(mutated) => rebuilt.push(mutated),
            Err(_) => rebuilt.push(value),
        }
    }

    headers.remove(&name);
    for value in rebuilt {
        headers.append(name.clone(), value);
    }
}
