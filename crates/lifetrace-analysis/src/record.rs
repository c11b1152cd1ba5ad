//! Per-object data model: allocation records, last-use/unreachable records,
//! and IID-update log entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source_loc::SourceLocId;

/// Stable non-negative object identity assigned by the upstream runtime.
pub type ObjectId = i32;

/// Well-known id of the script global object. The global is never tracked.
pub const GLOBAL_OBJECT_ID: ObjectId = 1;

/// Time value meaning "never observed".
pub const UNKNOWN_TIME: u64 = 0;

// ---------------------------------------------------------------------------
// ObjectType
// ---------------------------------------------------------------------------

/// Kind of heap object, as classified by the instrumented runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Object,
    Dom,
    Function,
    Prototype,
}

impl ObjectType {
    /// Canonical name used in the per-object record stream.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "OBJECT",
            Self::Dom => "DOM",
            Self::Function => "FUNCTION",
            Self::Prototype => "PROTOTYPE",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AllocInfo — allocation-side data for one object
// ---------------------------------------------------------------------------

/// Allocation-side data for one live or pending-unreachable object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocInfo {
    pub object_type: ObjectType,
    /// Allocation site; rewritten when the runtime reports an IID update.
    pub allocation_site: SourceLocId,
    /// 0 when the allocation itself was never observed.
    pub creation_time: u64,
    /// Shadow-stack snapshot at creation (or at the last IID update),
    /// bottom of stack first.
    pub creation_call_stack: Vec<SourceLocId>,
}

impl AllocInfo {
    pub fn new(
        object_type: ObjectType,
        allocation_site: SourceLocId,
        creation_time: u64,
        creation_call_stack: Vec<SourceLocId>,
    ) -> Self {
        Self {
            object_type,
            allocation_site,
            creation_time,
            creation_call_stack,
        }
    }

    /// Record for an object first observed through the DOM or the
    /// reachability analyzer, with no allocation event of its own.
    pub fn synthesized_dom() -> Self {
        Self {
            object_type: ObjectType::Dom,
            allocation_site: SourceLocId::UNKNOWN,
            creation_time: UNKNOWN_TIME,
            creation_call_stack: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// LastUseUnreachableInfo — use-side data, dense by object id
// ---------------------------------------------------------------------------

/// When an object was last used and when it became unreachable.
///
/// Both time fields obey a monotone-max write rule, and each site field
/// advances only together with its paired time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastUseUnreachableInfo {
    pub object_id: ObjectId,
    pub most_recent_use_time: u64,
    pub most_recent_use_site: SourceLocId,
    pub unreachable_time: u64,
    pub unreachable_site: SourceLocId,
}

impl LastUseUnreachableInfo {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            most_recent_use_time: UNKNOWN_TIME,
            most_recent_use_site: SourceLocId::UNKNOWN,
            unreachable_time: UNKNOWN_TIME,
            unreachable_site: SourceLocId::UNKNOWN,
        }
    }
}

// ---------------------------------------------------------------------------
// IidUpdateRecord — one allocation-site rewrite
// ---------------------------------------------------------------------------

/// One IID-update occurrence: the object whose allocation site was rewritten
/// and the site it was rewritten to. `creation_time` orders the emitted log;
/// it is not part of the binary record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IidUpdateRecord {
    pub object_id: ObjectId,
    pub creation_time: u64,
    pub new_site: SourceLocId,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
