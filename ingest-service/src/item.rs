use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single named value submitted by a client.
///
/// Items carry no identifier of their own. The storage key is assigned when the item is uploaded,
/// see [`ItemStore::upload`](crate::ItemStore::upload).
///
/// Unknown fields are ignored during deserialization and are therefore never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Item {
    /// The name of the item.
    pub name: String,
    /// The value of the item, kept as text.
    pub value: String,
}

/// Error returned by [`Item::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidItemError {
    /// The `name` field is empty.
    #[error("field `name` must not be empty")]
    EmptyName,
    /// The `value` field is empty.
    #[error("field `value` must not be empty")]
    EmptyValue,
}

impl Item {
    /// Creates a new item from its parts.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Checks that both fields carry text.
    pub fn validate(&self) -> Result<(), InvalidItemError> {
        if self.name.is_empty() {
            return Err(InvalidItemError::EmptyName);
        }
        if self.value.is_empty() {
            return Err(InvalidItemError::EmptyValue);
        }
        Ok(())
    }
}
