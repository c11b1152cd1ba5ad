//! Inbound event interface the trace driver dispatches into.
//!
//! One method per trace operation, delivered synchronously in trace order.
//! Operations a given analysis does not consume have default no-op bodies,
//! so an implementation overrides only what it observes and still accepts
//! the driver's full operation surface.

use std::collections::BTreeSet;
use std::io;

use thiserror::Error;

use crate::dom_forest::DomForestError;
use crate::record::ObjectId;
use crate::source_loc::{SourceLocId, SourceMap, Timer};

// ---------------------------------------------------------------------------
// AnalysisError — the single error surface of a run
// ---------------------------------------------------------------------------

/// Fatal conditions that abort a run. Trace quirks the analysis tolerates
/// (spurious unreachability, reparent-before-remove, future unreachable
/// times) never reach this type; nothing here is retried or recovered.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// IID update for an object with no live allocation record.
    #[error("iid update for unknown object {object_id}")]
    UpdateIidUnknownObject { object_id: ObjectId },

    /// Objects still tracked as live when the trace ended.
    #[error("{count} live objects remain at end of execution")]
    LiveObjectsAtEnd { count: usize },

    /// A function exit with no frame on the shadow stack.
    #[error("function exit with no matching function entry")]
    CallStackUnderflow,

    /// A record had to be emitted before `init` delivered the registry.
    #[error("source map not initialized before record emission")]
    SourceMapMissing,

    #[error(transparent)]
    Dom(#[from] DomForestError),

    #[error("output stream failure: {0}")]
    Io(#[from] io::Error),

    #[error("object record encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// TraceEventSink
// ---------------------------------------------------------------------------

/// Receiver of the instrumented runtime's memory-event trace.
///
/// The lifetime ties the shared collaborators handed over at `init` (the
/// driver's timer and the source-location registry) to the receiver: both
/// outlive it and neither is mutated while it runs.
pub trait TraceEventSink<'a> {
    /// First operation of every trace.
    fn init(&mut self, timer: &'a Timer, source_map: &'a SourceMap) -> Result<(), AnalysisError>;

    /// A plain object or DOM node was allocated.
    fn create(
        &mut self,
        site: SourceLocId,
        object_id: ObjectId,
        time: u64,
        is_dom: bool,
    ) -> Result<(), AnalysisError>;

    /// A function object and its prototype object were allocated together.
    fn create_fun(
        &mut self,
        site: SourceLocId,
        object_id: ObjectId,
        prototype_id: ObjectId,
        enter_site: SourceLocId,
        closure_names: &BTreeSet<String>,
        time: u64,
    ) -> Result<(), AnalysisError>;

    /// The reachability analyzer's claim of the object's final use.
    fn last_use(
        &mut self,
        object_id: ObjectId,
        site: SourceLocId,
        time: u64,
    ) -> Result<(), AnalysisError>;

    /// The reachability analyzer declared the object unreachable.
    fn unreachable_object(
        &mut self,
        site: SourceLocId,
        object_id: ObjectId,
        time: u64,
        shallow_size: u64,
    ) -> Result<(), AnalysisError>;

    /// The runtime re-attributed an earlier allocation to a new site.
    fn update_iid(
        &mut self,
        object_id: ObjectId,
        new_site: SourceLocId,
    ) -> Result<(), AnalysisError>;

    fn function_enter(
        &mut self,
        site: SourceLocId,
        function_id: ObjectId,
        call_site: SourceLocId,
        time: u64,
    ) -> Result<(), AnalysisError>;

    fn function_exit(&mut self, site: SourceLocId, time: u64) -> Result<(), AnalysisError>;

    fn add_dom_child(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        time: u64,
    ) -> Result<(), AnalysisError>;

    fn remove_dom_child(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        time: u64,
    ) -> Result<(), AnalysisError>;

    /// Establish a DOM root (the document, or a re-rooted fragment).
    fn dom_root(&mut self, node: ObjectId) -> Result<(), AnalysisError>;

    /// The trace's last-use section ended; pending unreachable records can
    /// be flushed.
    fn end_last_use(&mut self) -> Result<(), AnalysisError>;

    /// Final operation of every trace.
    fn end_execution(&mut self, time: u64) -> Result<(), AnalysisError>;

    // -- Operations accepted silently by this analysis --

    fn declare(
        &mut self,
        _site: SourceLocId,
        _name: &str,
        _object_id: ObjectId,
    ) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn put_field(
        &mut self,
        _site: SourceLocId,
        _base_id: ObjectId,
        _offset: &str,
        _object_id: ObjectId,
    ) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn write(
        &mut self,
        _site: SourceLocId,
        _name: &str,
        _object_id: ObjectId,
    ) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn top_level_flush(&mut self, _site: SourceLocId) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn debug(&mut self, _site: SourceLocId, _object_id: ObjectId) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn return_stmt(&mut self, _object_id: ObjectId) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn add_to_child_set(
        &mut self,
        _site: SourceLocId,
        _parent: ObjectId,
        _name: &str,
        _child: ObjectId,
    ) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn remove_from_child_set(
        &mut self,
        _site: SourceLocId,
        _parent: ObjectId,
        _name: &str,
        _child: ObjectId,
    ) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn script_enter(&mut self, _site: SourceLocId, _filename: &str) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn script_exit(&mut self, _site: SourceLocId) -> Result<(), AnalysisError> {
        Ok(())
    }

    fn unreachable_context(&mut self, _site: SourceLocId, _time: u64) -> Result<(), AnalysisError> {
        Ok(())
    }
}
