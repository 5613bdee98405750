//! Wire messages for wait-state snapshots.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` and are encoded as
//! named `MsgPack` via `rmp_serde::to_vec_named()`. Unset metadata fields
//! (sentinel `0` or no chain id) are omitted from the encoding rather than
//! written as explicit zeros.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Request provenance as carried between nodes.
///
/// Mirrors [`ActivityMetadata`](crate::ActivityMetadata); every field is
/// optional on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataMessage {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_chain_id: Option<[u64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub node_chain_id: Option<[u64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub current_request_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_host: Option<u32>,
    /// Widened to `u32` on the wire; readers truncate to 16 bits.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_port: Option<u32>,
}

/// Routing triple attached to a wait state. Always fully emitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuxInfoMessage {
    #[serde(default)]
    pub tablet_id: String,
    #[serde(default)]
    pub table_id: String,
    #[serde(default)]
    pub method: String,
}

/// Consistent snapshot of a [`WaitContext`](crate::WaitContext).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitContextMessage {
    #[serde(default)]
    pub metadata: MetadataMessage,
    pub activity_code: u32,
    /// Human-readable code name. Only populated by debug builds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub activity_code_name: Option<String>,
    #[serde(default)]
    pub aux_info: AuxInfoMessage,
}

impl WaitContextMessage {
    /// Encodes this snapshot as named `MsgPack`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitStateError::Encode`](crate::WaitStateError::Encode) if
    /// serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decodes a snapshot previously produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// Returns [`WaitStateError::Decode`](crate::WaitStateError::Decode) if
    /// `bytes` is not a valid encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
