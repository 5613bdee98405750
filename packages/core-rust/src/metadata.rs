//! Request provenance and routing records attached to a wait state.
//!
//! Both records treat `0` and empty values as "unset". Merging with
//! [`ActivityMetadata::update_from`] or [`AuxInfo::update_from`] only copies
//! fields that are set on the incoming side, so partial updates refine a record
//! incrementally. As a consequence a partial update can never reset a field
//! back to its sentinel.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::{Result, WaitStateError};
use crate::messages::{AuxInfoMessage, MetadataMessage};

// ---------------------------------------------------------------------------
// ActivityMetadata
// ---------------------------------------------------------------------------

/// Provenance of the request a wait state belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivityMetadata {
    /// Identifies the top-level request this work was spawned for.
    pub request_chain_id: Option<[u64; 2]>,
    /// Identifies the node the top-level request originated on.
    pub node_chain_id: Option<[u64; 2]>,
    /// Query identifier; `0` when unset.
    pub query_id: i64,
    /// Identifier of the request currently being served; `0` when unset.
    pub current_request_id: i64,
    /// Client IPv4 address with the first octet in the most significant byte;
    /// `0` when unset.
    pub client_host: u32,
    /// Client port; `0` when unset.
    pub client_port: u16,
}

impl ActivityMetadata {
    /// Merges `other` into `self`, overwriting only the fields `other` sets.
    ///
    /// Applying the same update twice is equivalent to applying it once.
    pub fn update_from(&mut self, other: &ActivityMetadata) {
        if other.request_chain_id.is_some() {
            self.request_chain_id = other.request_chain_id;
        }
        if other.node_chain_id.is_some() {
            self.node_chain_id = other.node_chain_id;
        }
        if other.query_id != 0 {
            self.query_id = other.query_id;
        }
        if other.current_request_id != 0 {
            self.current_request_id = other.current_request_id;
        }
        if other.client_host != 0 {
            self.client_host = other.client_host;
        }
        if other.client_port != 0 {
            self.client_port = other.client_port;
        }
    }

    /// Merges only the fields present in a wire message.
    ///
    /// Unlike [`update_from`](Self::update_from) this honors explicit zeros
    /// carried by the message, except for the port which is merged only when
    /// non-zero.
    pub fn update_from_wire(&mut self, msg: &MetadataMessage) {
        if let Some(id) = msg.request_chain_id {
            self.request_chain_id = Some(id);
        }
        if let Some(id) = msg.node_chain_id {
            self.node_chain_id = Some(id);
        }
        if let Some(id) = msg.query_id {
            self.query_id = id;
        }
        if let Some(id) = msg.current_request_id {
            self.current_request_id = id;
        }
        if let Some(host) = msg.client_host {
            self.client_host = host;
        }
        if let Some(port) = msg.client_port.filter(|p| *p != 0) {
            self.client_port = truncate_port(port);
        }
    }

    /// Parses a `host:port` endpoint into [`client_host`](Self::client_host)
    /// and [`client_port`](Self::client_port).
    ///
    /// Both fields are reset to `0` before parsing, so a failed parse never
    /// leaves a partially populated address behind.
    ///
    /// # Errors
    ///
    /// Returns [`WaitStateError::InvalidClientAddress`] when the endpoint has
    /// no `:` separator, the host is not a dotted-quad IPv4 address, or the
    /// port is not a number in `0..=65535`.
    pub fn set_client_address(&mut self, endpoint: &str) -> Result<()> {
        self.client_host = 0;
        self.client_port = 0;

        let (host, port) = parse_endpoint(endpoint).inspect_err(|err| {
            tracing::debug!(error = %err, "rejected client address");
        })?;
        self.client_host = u32::from(host);
        self.client_port = port;
        Ok(())
    }

    /// Returns the client endpoint if a host has been recorded.
    #[must_use]
    pub fn client_address(&self) -> Option<SocketAddrV4> {
        (self.client_host != 0)
            .then(|| SocketAddrV4::new(Ipv4Addr::from(self.client_host), self.client_port))
    }

    /// Converts to the wire form, omitting unset fields.
    #[must_use]
    pub fn to_wire(&self) -> MetadataMessage {
        MetadataMessage {
            request_chain_id: self.request_chain_id,
            node_chain_id: self.node_chain_id,
            query_id: non_zero(self.query_id),
            current_request_id: non_zero(self.current_request_id),
            client_host: non_zero(self.client_host),
            client_port: non_zero(u32::from(self.client_port)),
        }
    }

    /// Builds a record from its wire form; absent fields become sentinels.
    #[must_use]
    pub fn from_wire(msg: &MetadataMessage) -> Self {
        Self {
            request_chain_id: msg.request_chain_id,
            node_chain_id: msg.node_chain_id,
            query_id: msg.query_id.unwrap_or_default(),
            current_request_id: msg.current_request_id.unwrap_or_default(),
            client_host: msg.client_host.unwrap_or_default(),
            client_port: msg.client_port.map(truncate_port).unwrap_or_default(),
        }
    }
}

impl fmt::Display for ActivityMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ node_chain_id: {}, request_chain_id: {}, query_id: {}, current_request_id: {}, client_address: {}:{} }}",
            ChainId(self.node_chain_id),
            ChainId(self.request_chain_id),
            self.query_id,
            self.current_request_id,
            Ipv4Addr::from(self.client_host),
            self.client_port,
        )
    }
}

struct ChainId(Option<[u64; 2]>);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some([hi, lo]) => write!(f, "[{hi}, {lo}]"),
            None => f.write_str("[]"),
        }
    }
}

fn parse_endpoint(endpoint: &str) -> Result<(Ipv4Addr, u16)> {
    let invalid = |reason| WaitStateError::InvalidClientAddress {
        endpoint: endpoint.to_string(),
        reason,
    };
    let (host, port) = endpoint
        .split_once(':')
        .ok_or_else(|| invalid("missing port separator"))?;
    let host = host
        .parse::<Ipv4Addr>()
        .map_err(|_| invalid("host is not a dotted-quad IPv4 address"))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| invalid("port is not a number in 0..=65535"))?;
    Ok((host, port))
}

#[allow(clippy::cast_possible_truncation)]
fn truncate_port(port: u32) -> u16 {
    port as u16
}

fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

// ---------------------------------------------------------------------------
// AuxInfo
// ---------------------------------------------------------------------------

/// Routing information for the storage operation being waited on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuxInfo {
    pub tablet_id: String,
    pub table_id: String,
    pub method: String,
}

impl AuxInfo {
    /// Merges `other` into `self`, overwriting only non-empty fields.
    pub fn update_from(&mut self, other: &AuxInfo) {
        if !other.tablet_id.is_empty() {
            self.tablet_id.clone_from(&other.tablet_id);
        }
        if !other.table_id.is_empty() {
            self.table_id.clone_from(&other.table_id);
        }
        if !other.method.is_empty() {
            self.method.clone_from(&other.method);
        }
    }

    #[must_use]
    pub fn to_wire(&self) -> AuxInfoMessage {
        AuxInfoMessage {
            tablet_id: self.tablet_id.clone(),
            table_id: self.table_id.clone(),
            method: self.method.clone(),
        }
    }

    #[must_use]
    pub fn from_wire(msg: &AuxInfoMessage) -> Self {
        Self {
            tablet_id: msg.tablet_id.clone(),
            table_id: msg.table_id.clone(),
            method: msg.method.clone(),
        }
    }
}

impl fmt::Display for AuxInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ table_id: {}, tablet_id: {}, method: {} }}",
            self.table_id, self.tablet_id, self.method
        )
    }
}
