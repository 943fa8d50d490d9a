//! # Content Hashing
//!
//! Canonical fingerprints over the user-visible data of a ConfigMap or
//! Secret. The digest covers only `data`/`binaryData` (plus the Secret
//! `type`), never annotations, labels, or other metadata, so metadata
//! churn does not trigger reloads.
//!
//! The fingerprint is the first [`CONTENT_HASH_LEN`] hex characters of a
//! SHA-256 digest over a canonical `key=value;` stream in sorted key
//! order. The truncation length is fixed for the life of the process; a
//! stored fingerprint compares equal to a freshly computed one iff the
//! underlying data is unchanged.

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use sha2::{Digest, Sha256};

use crate::constants::CONTENT_HASH_LEN;

/// Fingerprint a ConfigMap's `data` and `binaryData`.
#[must_use]
pub fn hash_configmap(cm: &ConfigMap) -> String {
    let mut entries: Vec<(&str, &[u8])> = Vec::new();
    if let Some(data) = &cm.data {
        for (k, v) in data {
            entries.push((k.as_str(), v.as_bytes()));
        }
    }
    if let Some(binary) = &cm.binary_data {
        for (k, v) in binary {
            entries.push((k.as_str(), v.0.as_slice()));
        }
    }
    digest_entries(entries, None)
}

/// Fingerprint a Secret's `data` together with its `type`.
#[must_use]
pub fn hash_secret(secret: &Secret) -> String {
    let mut entries: Vec<(&str, &[u8])> = Vec::new();
    if let Some(data) = &secret.data {
        for (k, v) in data {
            entries.push((k.as_str(), v.0.as_slice()));
        }
    }
    digest_entries(entries, secret.type_.as_deref())
}

/// Digest `key=value;` pairs in sorted key order, with an optional
/// trailing type marker.
fn digest_entries(mut entries: Vec<(&str, &[u8])>, type_marker: Option<&str>) -> String {
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (key, value) in entries {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(value);
        hasher.update(b";");
    }
    if let Some(type_marker) = type_marker {
        hasher.update(b"type=");
        hasher.update(type_marker.as_bytes());
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex.truncate(CONTENT_HASH_LEN);
    hex
}
