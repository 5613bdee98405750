//! Activity codes describing what a unit of work is currently doing.
//!
//! The set of codes is open: call sites define their own constants with
//! [`ActivityCode::new`]. A code is a `u32` laid out as
//!
//! ```text
//!  31    28 27    24 23                           0
//! +--------+--------+------------------------------+
//! | comp.  | class  |            ordinal           |
//! +--------+--------+------------------------------+
//! ```
//!
//! where the top nibble names the emitting [`Component`] and the top byte
//! names the [`WaitClass`]. The all-zero code is the sentinel
//! [`ActivityCode::UNUSED`].

use std::fmt;

use serde::{Deserialize, Serialize};

const COMPONENT_MASK: u32 = 0xF000_0000;
const CLASS_MASK: u32 = 0xFF00_0000;
const ORDINAL_MASK: u32 = 0x00FF_FFFF;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Process layer that emitted an activity code (top four bits of the code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Component(u32);

impl Component {
    /// Backend query-processing layer.
    pub const PG: Self = Self(0x0000_0000);
    /// Client library bridging the query layer to storage.
    pub const YBC: Self = Self(0xC000_0000);
    /// Tablet server.
    pub const TSERVER: Self = Self(0xE000_0000);
    /// Query gateway inside the backend process.
    pub const PG_GATE: Self = Self(0xF000_0000);

    /// Returns the masked bits of this component.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns the well-known name of this component, if it has one.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0x0000_0000 => Some("Pg"),
            0xC000_0000 => Some("Ybc"),
            0xE000_0000 => Some("TServer"),
            0xF000_0000 => Some("PgGate"),
            _ => None,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#x}", self.0 >> 28),
        }
    }
}

// ---------------------------------------------------------------------------
// WaitClass
// ---------------------------------------------------------------------------

/// Category of wait an activity code belongs to (top byte of the code).
///
/// The top nibble of a class always matches its [`Component`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitClass(u32);

impl WaitClass {
    pub const PG_WAIT_PERFORM: Self = Self(0x0E00_0000);

    pub const PG_CLIENT_SERVICE: Self = Self(0xCF00_0000);
    pub const CQL_WAIT_STATE: Self = Self(0xCE00_0000);
    pub const CLIENT: Self = Self(0xCD00_0000);

    pub const RPC: Self = Self(0xEF00_0000);
    pub const FLUSH_AND_COMPACTION: Self = Self(0xEE00_0000);
    pub const CONSENSUS: Self = Self(0xED00_0000);
    pub const TABLET_WAIT: Self = Self(0xEC00_0000);
    pub const ROCKSDB: Self = Self(0xEB00_0000);

    /// Builds a class from the top byte of a code. Lower bits are discarded.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & CLASS_MASK)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Component that owns this class.
    #[must_use]
    pub const fn component(self) -> Component {
        Component(self.0 & COMPONENT_MASK)
    }

    /// Returns the well-known name of this class, if it has one.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self.0 {
            0x0E00_0000 => Some("PgWaitPerform"),
            0xCF00_0000 => Some("PgClientService"),
            0xCE00_0000 => Some("CqlWaitState"),
            0xCD00_0000 => Some("Client"),
            0xEF00_0000 => Some("Rpc"),
            0xEE00_0000 => Some("FlushAndCompaction"),
            0xED00_0000 => Some("Consensus"),
            0xEC00_0000 => Some("TabletWait"),
            0xEB00_0000 => Some("RocksDb"),
            _ => None,
        }
    }
}

impl fmt::Display for WaitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#04x}", self.0 >> 24),
        }
    }
}

// ---------------------------------------------------------------------------
// ActivityCode
// ---------------------------------------------------------------------------

/// What a unit of work is currently doing or waiting on.
///
/// Serializes as its raw `u32` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityCode(u32);

impl ActivityCode {
    /// Sentinel for "no activity recorded".
    pub const UNUSED: Self = Self(0);

    /// Builds a code in `class` with the given ordinal. Ordinals wider than
    /// 24 bits are truncated.
    #[must_use]
    pub const fn new(class: WaitClass, ordinal: u32) -> Self {
        Self(class.0 | (ordinal & ORDINAL_MASK))
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_unused(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn component(self) -> Component {
        Component(self.0 & COMPONENT_MASK)
    }

    #[must_use]
    pub const fn class(self) -> WaitClass {
        WaitClass(self.0 & CLASS_MASK)
    }

    #[must_use]
    pub const fn ordinal(self) -> u32 {
        self.0 & ORDINAL_MASK
    }
}

impl From<u32> for ActivityCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<ActivityCode> for u32 {
    fn from(code: ActivityCode) -> Self {
        code.0
    }
}

/// Renders `Unused` for the sentinel and `Component::Class#ordinal` otherwise.
impl fmt::Display for ActivityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unused() {
            return f.write_str("Unused");
        }
        write!(f, "{}::{}#{}", self.component(), self.class(), self.ordinal())
    }
}
