//! JSON nodes over the block store.
//!
//! A node is a JSON object written as canonical bytes. Some of its fields are
//! *links*: they hold addresses of other blocks (an entry's `next` and `refs`,
//! a manifest's `heads`). Links are checked on both write and read so that a
//! graph walk never follows a field that cannot be an address.

use bytes::Bytes;
use serde_json::Value;

use super::canonical::canonical_bytes;
use super::{BlockStore, StoreError, is_address};

/// Link fields of an entry block.
pub const ENTRY_LINKS: &[&str] = &["next", "refs"];

/// Link fields of a log manifest block.
pub const MANIFEST_LINKS: &[&str] = &["heads"];

/// Write a JSON node and return its address.
///
/// # Errors
///
/// Returns [`StoreError::InvalidLink`] if a link field holds anything other
/// than addresses, or any error from the underlying store.
pub async fn write_node(
    store: &dyn BlockStore,
    value: &Value,
    links: &[&str],
) -> Result<String, StoreError> {
    check_links(value, links)?;
    store.put(Bytes::from(canonical_bytes(value))).await
}

/// Read a JSON node by address.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if the block is absent,
/// [`StoreError::Malformed`] if it is not a JSON object, and
/// [`StoreError::InvalidLink`] if a link field is not made of addresses.
pub async fn read_node(
    store: &dyn BlockStore,
    address: &str,
    links: &[&str],
) -> Result<Value, StoreError> {
    let Some(data) = store.get(address).await? else {
        return Err(StoreError::NotFound(address.to_owned()));
    };

    let value: Value = serde_json::from_slice(&data).map_err(|e| StoreError::Malformed {
        address: address.to_owned(),
        reason: e.to_string(),
    })?;

    if !value.is_object() {
        return Err(StoreError::Malformed {
            address: address.to_owned(),
            reason: "node is not a JSON object".into(),
        });
    }

    check_links(&value, links)?;
    Ok(value)
}

fn check_links(value: &Value, links: &[&str]) -> Result<(), StoreError> {
    for field in links {
        let ok = match value.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => is_address(s),
            Some(Value::Array(items)) => items
                .iter()
                .all(|item| item.as_str().is_some_and(is_address)),
            Some(_) => false,
        };
        if !ok {
            return Err(StoreError::InvalidLink {
                field: (*field).to_owned(),
            });
        }
    }
    Ok(())
}
