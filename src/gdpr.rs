//! Keyed-hash obfuscation of personal-data fields before records leave the host

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashSet;
use thiserror::Error;

use crate::queue::DomainRecord;

type HmacSha256 = Hmac<Sha256>;

/// Prefix marking an obfuscated value
pub const OBFUSCATED_PREFIX: &str = "hmac-sha256:";

/// Key of the delivery metadata object, never obfuscated
const META_KEY: &str = "meta";

#[derive(Debug, Error)]
pub enum GdprError {
    #[error("GDPR pre-shared key must not be empty")]
    EmptyKey,
}

/// Replaces configured string fields with `hmac-sha256:<hex>` digests
#[derive(Clone)]
pub struct Obfuscator {
    key: Vec<u8>,
    fields: HashSet<String>,
}

impl std::fmt::Debug for Obfuscator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Obfuscator")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Obfuscator {
    pub fn new<I, S>(psk: &str, fields: I) -> Result<Self, GdprError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if psk.is_empty() {
            return Err(GdprError::EmptyKey);
        }

        Ok(Self {
            key: psk.as_bytes().to_vec(),
            fields: fields
                .into_iter()
                .map(|f| f.as_ref().trim().to_lowercase())
                .collect(),
        })
    }

    /// Digest of one value under the pre-shared key
    pub fn digest(&self, value: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(value.as_bytes());
        let bytes = mac.finalize().into_bytes();

        let mut out = String::with_capacity(OBFUSCATED_PREFIX.len() + bytes.len() * 2);
        out.push_str(OBFUSCATED_PREFIX);
        for byte in bytes {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    /// Obfuscate matching fields anywhere in the record, returns how many were replaced
    pub fn apply(&self, record: &mut DomainRecord) -> usize {
        let mut replaced = 0;
        for (key, value) in record.iter_mut() {
            if key == META_KEY {
                continue;
            }
            replaced += self.visit(key, value);
        }
        replaced
    }

    fn visit(&self, key: &str, value: &mut Value) -> usize {
        match value {
            Value::String(text) if self.matches(key) && !text.starts_with(OBFUSCATED_PREFIX) => {
                *text = self.digest(text);
                1
            }
            Value::Object(map) => map.iter_mut().map(|(k, v)| self.visit(k, v)).sum(),
            Value::Array(items) => items.iter_mut().map(|v| self.visit(key, v)).sum(),
            _ => 0,
        }
    }

    fn matches(&self, key: &str) -> bool {
        self.fields.contains(&key.trim().to_lowercase())
    }
}
