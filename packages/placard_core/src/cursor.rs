//! Opaque pagination cursors.
//!
//! A cursor wraps a sort key (the active sort field's value plus the entity id)
//! together with the name of the field it was issued for. The wire form is a
//! compact JSON document in URL-safe, unpadded base64. Callers must treat it as
//! opaque; only this module looks inside.

use std::fmt;

use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::error::QueryError;
use crate::sort::{SortKey, SortValue};

/// Upper bound on an untrusted token, checked before decoding.
const MAX_CURSOR_LEN: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Deserialize)]
struct CursorToken {
    f: String,
    v: SortValue,
    i: EntityId,
}

/// Encode `key` as a cursor valid for sorts on `field`.
pub fn encode(field: &str, key: &SortKey) -> Cursor {
    // serde_json's default map is ordered, so equal keys give equal bytes.
    let doc = serde_json::json!({
        "f": field,
        "v": key.value,
        "i": key.id,
    });
    Cursor(BASE64URL_NOPAD.encode(doc.to_string().as_bytes()))
}

/// Decode a cursor issued for `expected_field`.
pub fn decode(cursor: &Cursor, expected_field: &str) -> Result<SortKey, QueryError> {
    let raw = cursor.as_str().trim();
    if raw.is_empty() {
        return Err(QueryError::InvalidCursor("cursor is empty".into()));
    }
    if raw.len() > MAX_CURSOR_LEN {
        return Err(QueryError::InvalidCursor(format!(
            "cursor exceeds {MAX_CURSOR_LEN} bytes"
        )));
    }

    let bytes = BASE64URL_NOPAD
        .decode(raw.as_bytes())
        .map_err(|e| QueryError::InvalidCursor(format!("malformed cursor: {e}")))?;
    let token: CursorToken = serde_json::from_slice(&bytes)
        .map_err(|e| QueryError::InvalidCursor(format!("malformed cursor: {e}")))?;

    if token.f != expected_field {
        return Err(QueryError::InvalidCursor(format!(
            "cursor was issued for sort field `{}`, not `{expected_field}`",
            token.f
        )));
    }

    Ok(SortKey::new(token.v, token.i))
}
