//! The shared wait-state record.
//!
//! A [`WaitContext`] splits its state in two:
//!
//! - the activity code lives in an atomic cell so that samplers on other
//!   threads can read it without ever blocking the owner, and
//! - metadata, aux info and (with `track-history`) the code history sit behind
//!   one short-hold mutex, so composite reads see a non-torn snapshot.
//!
//! The two are never unified under a single lock.

use std::fmt;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::code::ActivityCode;
use crate::config::WaitContextConfig;
use crate::error::Result;
use crate::messages::WaitContextMessage;
use crate::metadata::{ActivityMetadata, AuxInfo};

#[cfg(feature = "track-history")]
use std::collections::VecDeque;

/// Fields serialized by the context's lock.
#[derive(Debug)]
struct Guarded {
    metadata: ActivityMetadata,
    aux_info: AuxInfo,
    #[cfg(feature = "track-history")]
    history: History,
}

#[cfg(feature = "track-history")]
#[derive(Debug)]
struct History {
    codes: VecDeque<ActivityCode>,
    capacity: usize,
    num_updates: u64,
}

#[cfg(feature = "track-history")]
impl History {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            codes: VecDeque::with_capacity(capacity),
            capacity,
            num_updates: 0,
        }
    }

    fn push(&mut self, code: ActivityCode) {
        if self.capacity == 0 {
            self.num_updates += 1;
            return;
        }
        if self.codes.len() == self.capacity {
            self.codes.pop_front();
        }
        self.codes.push_back(code);
        self.num_updates += 1;
    }
}

/// What one unit of work is doing right now, and on whose behalf.
///
/// Shared as `Arc<WaitContext>` between the thread doing the work (through
/// [`ScopedContext`](crate::ScopedContext)) and any longer-lived owner or
/// sampler. Every method takes `&self` and is safe to call from any thread.
#[derive(Debug)]
pub struct WaitContext {
    code: AtomicU32,
    inner: Mutex<Guarded>,
}

impl Default for WaitContext {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitContext {
    /// Creates a context with empty metadata and code [`ActivityCode::UNUSED`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WaitContextConfig::default())
    }

    /// Creates a context seeded with `metadata`.
    #[must_use]
    pub fn from_metadata(metadata: ActivityMetadata) -> Self {
        Self::with_config(WaitContextConfig {
            initial_metadata: metadata,
            ..WaitContextConfig::default()
        })
    }

    #[must_use]
    pub fn with_config(config: WaitContextConfig) -> Self {
        Self {
            code: AtomicU32::new(ActivityCode::UNUSED.raw()),
            inner: Mutex::new(Guarded {
                metadata: config.initial_metadata,
                aux_info: AuxInfo::default(),
                #[cfg(feature = "track-history")]
                history: History::with_capacity(config.history_capacity),
            }),
        }
    }

    /// Rebuilds a detached context from a wire snapshot.
    #[must_use]
    pub fn from_wire(msg: &WaitContextMessage) -> Self {
        let ctx = Self::from_metadata(ActivityMetadata::from_wire(&msg.metadata));
        ctx.inner.lock().aux_info = AuxInfo::from_wire(&msg.aux_info);
        ctx.code.store(msg.activity_code, Ordering::Release);
        ctx
    }

    // -----------------------------------------------------------------------
    // Activity code
    // -----------------------------------------------------------------------

    /// Returns the current activity code without taking the lock.
    #[must_use]
    pub fn activity_code(&self) -> ActivityCode {
        ActivityCode::from_raw(self.code.load(Ordering::Acquire))
    }

    /// Stores `code` as the current activity.
    ///
    /// With `track-history` the code is also appended to the history. The
    /// append happens after the atomic store, so a history reader may briefly
    /// lag the cell by one entry.
    pub fn set_activity_code(&self, code: ActivityCode) {
        self.replace_activity_code(code);
    }

    /// Stores `code` like [`set_activity_code`](Self::set_activity_code) and
    /// returns the code it displaced, read in the same atomic step.
    pub fn replace_activity_code(&self, code: ActivityCode) -> ActivityCode {
        let prev = ActivityCode::from_raw(self.code.swap(code.raw(), Ordering::AcqRel));
        self.record_transition(prev, code);
        prev
    }

    /// Replaces the activity code with `new` only if it is still `expected`.
    ///
    /// Returns whether the swap happened. Used by
    /// [`ScopedStatus`](crate::ScopedStatus) so that a restore never clobbers a
    /// code written by someone else in the meantime.
    pub fn compare_and_set_activity_code(&self, expected: ActivityCode, new: ActivityCode) -> bool {
        let swapped = self
            .code
            .compare_exchange(expected.raw(), new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            self.record_transition(expected, new);
        }
        swapped
    }

    #[cfg_attr(not(feature = "track-history"), allow(clippy::unused_self))]
    fn record_transition(&self, prev: ActivityCode, code: ActivityCode) {
        tracing::trace!(code = %code, prev = %prev, "wait status changed");
        #[cfg(feature = "track-history")]
        self.inner.lock().history.push(code);
    }

    /// Past activity codes, oldest first, bounded by the configured capacity.
    #[cfg(feature = "track-history")]
    #[must_use]
    pub fn history(&self) -> Vec<ActivityCode> {
        self.inner.lock().history.codes.iter().copied().collect()
    }

    /// Number of code changes recorded, including evicted ones.
    #[cfg(feature = "track-history")]
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.inner.lock().history.num_updates
    }

    // -----------------------------------------------------------------------
    // Metadata and aux info
    // -----------------------------------------------------------------------

    /// Merges `partial` into the metadata, see [`ActivityMetadata::update_from`].
    pub fn update_metadata(&self, partial: &ActivityMetadata) {
        self.inner.lock().metadata.update_from(partial);
    }

    /// Merges `partial` into the aux info, see [`AuxInfo::update_from`].
    pub fn update_aux_info(&self, partial: &AuxInfo) {
        self.inner.lock().aux_info.update_from(partial);
    }

    /// Runs `f` with exclusive access to the metadata.
    ///
    /// The lock is held for the duration of `f`; keep it short and do not
    /// call back into this context from inside it.
    pub fn with_metadata_mut<R>(&self, f: impl FnOnce(&mut ActivityMetadata) -> R) -> R {
        f(&mut self.inner.lock().metadata)
    }

    #[must_use]
    pub fn metadata(&self) -> ActivityMetadata {
        self.inner.lock().metadata.clone()
    }

    #[must_use]
    pub fn aux_info(&self) -> AuxInfo {
        self.inner.lock().aux_info.clone()
    }

    #[must_use]
    pub fn query_id(&self) -> i64 {
        self.inner.lock().metadata.query_id
    }

    pub fn set_query_id(&self, query_id: i64) {
        self.inner.lock().metadata.query_id = query_id;
    }

    #[must_use]
    pub fn current_request_id(&self) -> i64 {
        self.inner.lock().metadata.current_request_id
    }

    pub fn set_current_request_id(&self, id: i64) {
        self.inner.lock().metadata.current_request_id = id;
    }

    #[must_use]
    pub fn request_chain_id(&self) -> Option<[u64; 2]> {
        self.inner.lock().metadata.request_chain_id
    }

    pub fn set_request_chain_id(&self, id: [u64; 2]) {
        self.inner.lock().metadata.request_chain_id = Some(id);
    }

    #[must_use]
    pub fn node_chain_id(&self) -> Option<[u64; 2]> {
        self.inner.lock().metadata.node_chain_id
    }

    pub fn set_node_chain_id(&self, id: [u64; 2]) {
        self.inner.lock().metadata.node_chain_id = Some(id);
    }

    #[must_use]
    pub fn client_address(&self) -> Option<SocketAddrV4> {
        self.inner.lock().metadata.client_address()
    }

    /// Parses and stores the client endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WaitStateError::InvalidClientAddress`](crate::WaitStateError::InvalidClientAddress)
    /// for a malformed endpoint; host and port are then left at `0`.
    pub fn set_client_address(&self, endpoint: &str) -> Result<()> {
        self.inner.lock().metadata.set_client_address(endpoint)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Takes a consistent snapshot of the whole context under one lock
    /// acquisition. Debug builds also fill in the code's name.
    #[must_use]
    pub fn to_wire(&self) -> WaitContextMessage {
        let guarded = self.inner.lock();
        let code = self.activity_code();
        WaitContextMessage {
            metadata: guarded.metadata.to_wire(),
            activity_code: code.raw(),
            activity_code_name: cfg!(debug_assertions).then(|| code.to_string()),
            aux_info: guarded.aux_info.to_wire(),
        }
    }

    /// Snapshots and encodes the context as named `MsgPack`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitStateError::Encode`](crate::WaitStateError::Encode) if
    /// serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.to_wire().encode()
    }
}

impl fmt::Display for WaitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guarded = self.inner.lock();
        write!(
            f,
            "{{ metadata: {}, code: {}, aux_info: {}",
            guarded.metadata,
            self.activity_code(),
            guarded.aux_info,
        )?;
        #[cfg(feature = "track-history")]
        {
            write!(f, ", num_updates: {}, history: [", guarded.history.num_updates)?;
            for (i, code) in guarded.history.codes.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{code}")?;
            }
            f.write_str("]")?;
        }
        f.write_str(" }")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::code::WaitClass;
    use crate::messages::{AuxInfoMessage, MetadataMessage};

    const EXECUTING: ActivityCode = ActivityCode::new(WaitClass::RPC, 1);
    const FLUSHING: ActivityCode = ActivityCode::new(WaitClass::FLUSH_AND_COMPACTION, 1);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("waitstate_core=trace"))
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn new_context_is_unused_and_empty() {
        let ctx = WaitContext::new();
        assert_eq!(ctx.activity_code(), ActivityCode::UNUSED);
        assert_eq!(ctx.metadata(), ActivityMetadata::default());
        assert_eq!(ctx.aux_info(), AuxInfo::default());
    }

    #[test]
    fn set_activity_code_is_visible() {
        init_tracing();
        let ctx = WaitContext::new();
        ctx.set_activity_code(EXECUTING);
        assert_eq!(ctx.activity_code(), EXECUTING);
        ctx.set_activity_code(FLUSHING);
        assert_eq!(ctx.activity_code(), FLUSHING);
    }

    #[test]
    fn replace_returns_displaced_code() {
        let ctx = WaitContext::new();
        assert_eq!(ctx.replace_activity_code(EXECUTING), ActivityCode::UNUSED);
        assert_eq!(ctx.replace_activity_code(FLUSHING), EXECUTING);
        assert_eq!(ctx.activity_code(), FLUSHING);
    }

    #[test]
    fn compare_and_set_only_swaps_expected_code() {
        let ctx = WaitContext::new();
        ctx.set_activity_code(EXECUTING);
        assert!(!ctx.compare_and_set_activity_code(FLUSHING, ActivityCode::UNUSED));
        assert_eq!(ctx.activity_code(), EXECUTING);
        assert!(ctx.compare_and_set_activity_code(EXECUTING, FLUSHING));
        assert_eq!(ctx.activity_code(), FLUSHING);
    }

    #[test]
    fn from_metadata_seeds_fields() {
        let ctx = WaitContext::from_metadata(ActivityMetadata {
            query_id: 42,
            ..ActivityMetadata::default()
        });
        assert_eq!(ctx.query_id(), 42);
    }

    #[test]
    fn update_metadata_merges() {
        let ctx = WaitContext::new();
        ctx.set_query_id(42);
        ctx.update_metadata(&ActivityMetadata {
            current_request_id: 7,
            ..ActivityMetadata::default()
        });
        assert_eq!(ctx.query_id(), 42);
        assert_eq!(ctx.current_request_id(), 7);
    }

    #[test]
    fn update_aux_info_merges() {
        let ctx = WaitContext::new();
        ctx.update_aux_info(&AuxInfo {
            tablet_id: "tablet-1".to_string(),
            method: "Read".to_string(),
            ..AuxInfo::default()
        });
        ctx.update_aux_info(&AuxInfo {
            method: "Write".to_string(),
            ..AuxInfo::default()
        });
        let aux = ctx.aux_info();
        assert_eq!(aux.tablet_id, "tablet-1");
        assert_eq!(aux.method, "Write");
    }

    #[test]
    fn field_accessors_round_trip() {
        let ctx = WaitContext::new();
        ctx.set_current_request_id(5);
        ctx.set_request_chain_id([1, 2]);
        ctx.set_node_chain_id([3, 4]);
        ctx.set_client_address("192.168.1.20:9042").expect("valid endpoint");
        assert_eq!(ctx.current_request_id(), 5);
        assert_eq!(ctx.request_chain_id(), Some([1, 2]));
        assert_eq!(ctx.node_chain_id(), Some([3, 4]));
        assert_eq!(ctx.client_address(), Some("192.168.1.20:9042".parse().unwrap()));
    }

    #[test]
    fn bad_client_address_clears_previous_one() {
        let ctx = WaitContext::new();
        ctx.set_client_address("10.0.0.1:5433").expect("valid endpoint");
        assert!(ctx.set_client_address("badinput").is_err());
        let meta = ctx.metadata();
        assert_eq!((meta.client_host, meta.client_port), (0, 0));
    }

    #[test]
    fn with_metadata_mut_exposes_record_under_lock() {
        let ctx = WaitContext::new();
        let previous = ctx.with_metadata_mut(|meta| {
            let previous = meta.query_id;
            meta.query_id = 99;
            previous
        });
        assert_eq!(previous, 0);
        assert_eq!(ctx.query_id(), 99);
    }

    #[test]
    fn to_wire_snapshots_everything() {
        let ctx = WaitContext::new();
        ctx.set_query_id(42);
        ctx.set_activity_code(EXECUTING);
        ctx.update_aux_info(&AuxInfo {
            table_id: "orders".to_string(),
            ..AuxInfo::default()
        });

        let msg = ctx.to_wire();
        assert_eq!(
            msg.metadata,
            MetadataMessage {
                query_id: Some(42),
                ..MetadataMessage::default()
            }
        );
        assert_eq!(msg.activity_code, EXECUTING.raw());
        assert_eq!(
            msg.aux_info,
            AuxInfoMessage {
                table_id: "orders".to_string(),
                ..AuxInfoMessage::default()
            }
        );
        if cfg!(debug_assertions) {
            assert_eq!(msg.activity_code_name.as_deref(), Some("TServer::Rpc#1"));
        } else {
            assert_eq!(msg.activity_code_name, None);
        }
    }

    #[test]
    fn encode_then_rebuild_preserves_state() {
        let ctx = WaitContext::new();
        ctx.set_request_chain_id([10, 20]);
        ctx.set_client_address("10.1.2.3:7100").expect("valid endpoint");
        ctx.set_activity_code(FLUSHING);
        ctx.update_aux_info(&AuxInfo {
            tablet_id: "t".to_string(),
            table_id: "tbl".to_string(),
            method: "Flush".to_string(),
        });

        let bytes = ctx.encode().expect("encode");
        let msg = WaitContextMessage::decode(&bytes).expect("decode");
        let rebuilt = WaitContext::from_wire(&msg);
        assert_eq!(rebuilt.metadata(), ctx.metadata());
        assert_eq!(rebuilt.aux_info(), ctx.aux_info());
        assert_eq!(rebuilt.activity_code(), FLUSHING);
    }

    #[test]
    fn display_renders_snapshot() {
        let ctx = WaitContext::new();
        ctx.set_query_id(42);
        ctx.set_activity_code(EXECUTING);
        let rendered = ctx.to_string();
        assert!(rendered.starts_with("{ metadata: { node_chain_id: [], "));
        assert!(rendered.contains("query_id: 42"));
        assert!(rendered.contains("code: TServer::Rpc#1"));
        assert!(rendered.contains("aux_info: { table_id: , tablet_id: , method:  }"));
        assert!(rendered.ends_with(" }"));
    }

    #[test]
    fn shared_across_threads() {
        let ctx = Arc::new(WaitContext::new());
        let writer = {
            let ctx = Arc::clone(&ctx);
            thread::spawn(move || {
                ctx.set_query_id(7);
                ctx.set_activity_code(EXECUTING);
            })
        };
        writer.join().expect("writer thread");
        assert_eq!(ctx.query_id(), 7);
        assert_eq!(ctx.activity_code(), EXECUTING);
    }

    #[cfg(feature = "track-history")]
    mod history {
        use super::*;

        #[test]
        fn records_every_transition() {
            let ctx = WaitContext::new();
            ctx.set_activity_code(EXECUTING);
            ctx.set_activity_code(FLUSHING);
            assert!(ctx.compare_and_set_activity_code(FLUSHING, EXECUTING));
            assert!(!ctx.compare_and_set_activity_code(FLUSHING, ActivityCode::UNUSED));
            assert_eq!(ctx.history(), vec![EXECUTING, FLUSHING, EXECUTING]);
            assert_eq!(ctx.update_count(), 3);
        }

        #[test]
        fn evicts_oldest_beyond_capacity() {
            let ctx = WaitContext::with_config(WaitContextConfig {
                history_capacity: 2,
                ..WaitContextConfig::default()
            });
            for ordinal in 1..=4 {
                ctx.set_activity_code(ActivityCode::new(WaitClass::RPC, ordinal));
            }
            assert_eq!(
                ctx.history(),
                vec![ActivityCode::new(WaitClass::RPC, 3), ActivityCode::new(WaitClass::RPC, 4)]
            );
            assert_eq!(ctx.update_count(), 4);
        }

        #[test]
        fn zero_capacity_only_counts() {
            let ctx = WaitContext::with_config(WaitContextConfig {
                history_capacity: 0,
                ..WaitContextConfig::default()
            });
            ctx.set_activity_code(EXECUTING);
            assert!(ctx.history().is_empty());
            assert_eq!(ctx.update_count(), 1);
        }

        #[test]
        fn display_includes_history() {
            let ctx = WaitContext::new();
            ctx.set_activity_code(EXECUTING);
            ctx.set_activity_code(FLUSHING);
            let rendered = ctx.to_string();
            assert!(rendered.contains(
                "num_updates: 2, history: [TServer::Rpc#1, TServer::FlushAndCompaction#1]"
            ));
        }
    }
}
