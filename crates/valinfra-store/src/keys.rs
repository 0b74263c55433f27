//! Key encoding utilities for `RocksDB`.
//!
//! Primary records are keyed by their raw 32-byte ID. Secondary indexes are
//! value-less keys that concatenate a prefix (owner, parent or status) with the
//! child ID, so that a prefix scan yields every child of a parent.

/// Encode a primary key (the raw ID bytes).
#[must_use]
pub fn id_key(id: &impl AsRef<[u8]>) -> Vec<u8> {
    id.as_ref().to_vec()
}

/// Encode a parent-child index key: `parent || child`.
#[must_use]
pub fn index_key(parent: &impl AsRef<[u8]>, child: &impl AsRef<[u8]>) -> Vec<u8> {
    let parent = parent.as_ref();
    let child = child.as_ref();
    let mut key = Vec::with_capacity(parent.len() + child.len());
    key.extend_from_slice(parent);
    key.extend_from_slice(child);
    key
}

/// Encode a parent prefix for scanning an index.
#[must_use]
pub fn prefix(parent: &impl AsRef<[u8]>) -> Vec<u8> {
    parent.as_ref().to_vec()
}

/// Encode a status index key: `status || child`.
#[must_use]
pub fn status_key(status: u8, child: &impl AsRef<[u8]>) -> Vec<u8> {
    let child = child.as_ref();
    let mut key = Vec::with_capacity(1 + child.len());
    key.push(status);
    key.extend_from_slice(child);
    key
}

/// Encode a status prefix for scanning a status index.
#[must_use]
pub fn status_prefix(status: u8) -> Vec<u8> {
    vec![status]
}

/// Encode a network configuration key.
#[must_use]
pub fn network_key(network: &str) -> Vec<u8> {
    network.as_bytes().to_vec()
}

/// Extract the trailing 32-byte child ID from an index key whose prefix is
/// `prefix_len` bytes long.
///
/// Returns `None` if the key is too short.
#[must_use]
pub fn child_id(key: &[u8], prefix_len: usize) -> Option<[u8; 32]> {
    key.get(prefix_len..prefix_len + 32)?.try_into().ok()
}
