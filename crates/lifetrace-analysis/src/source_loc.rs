//! Source locations and the shared location registry.
//!
//! Every trace event carries an opaque `(file_id, iid)` pair naming the
//! source position the instrumented runtime attributed to it. The registry
//! resolves pairs to printable strings for the per-object record stream;
//! the binary streams carry the raw pair unresolved.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SourceLocId — opaque source-position identity
// ---------------------------------------------------------------------------

/// Opaque identifier of a source location: an instrumented file id plus the
/// instruction id within that file.
///
/// Negative file ids are reserved for sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocId {
    pub file_id: i32,
    pub iid: i32,
}

impl SourceLocId {
    /// Position of events the runtime could not attribute.
    pub const UNKNOWN: SourceLocId = SourceLocId {
        file_id: -1,
        iid: -1,
    };

    /// Sentinel stamped on nodes detached from the live DOM; a removal has
    /// no caller-side source position.
    pub const REMOVE_FROM_DOM: SourceLocId = SourceLocId {
        file_id: -1,
        iid: -2,
    };

    pub const fn new(file_id: i32, iid: i32) -> Self {
        Self { file_id, iid }
    }

    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl fmt::Display for SourceLocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_id, self.iid)
    }
}

// ---------------------------------------------------------------------------
// SourceMap — id-to-printable-location registry
// ---------------------------------------------------------------------------

/// Registry mapping location ids to printable source positions.
///
/// Shared by immutable reference with every analysis for the duration of a
/// run. Ids the trace producer never described resolve to their raw
/// `file:iid` form.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    locations: BTreeMap<SourceLocId, String>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the printable form of a location id.
    pub fn register(&mut self, id: SourceLocId, printable: impl Into<String>) {
        self.locations.insert(id, printable.into());
    }

    /// Printable form of `id`. Sentinels resolve to their well-known names.
    pub fn resolve(&self, id: SourceLocId) -> String {
        if id == SourceLocId::UNKNOWN {
            return "unknown".to_string();
        }
        if id == SourceLocId::REMOVE_FROM_DOM {
            return "removeFromDOM".to_string();
        }
        match self.locations.get(&id) {
            Some(printable) => printable.clone(),
            None => id.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Timer — the trace driver's logical clock
// ---------------------------------------------------------------------------

/// Logical clock owned by the trace driver: one tick per trace event.
///
/// Handed to every analysis at `init`; this analysis reads event times from
/// the events themselves, so it only holds the reference.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    now: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn advance(&mut self) -> u64 {
        self.now += 1;
        self.now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
