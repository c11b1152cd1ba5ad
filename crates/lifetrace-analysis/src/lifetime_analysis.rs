//! Single-pass streaming object-lifetime analysis.
//!
//! Consumes the chronologically ordered memory-event trace of an
//! instrumented script runtime and emits, per object, when it was allocated,
//! last used, and became unreachable, with the source positions and
//! call-stack context of each. The output feeds a staleness analysis: one
//! textual per-object stream plus three sorted binary streams that, together
//! with the original trace, form the enhanced trace.
//!
//! Uninstrumented code makes the input adversarial. The reachability
//! analyzer can declare an object unreachable and later be contradicted by a
//! use; DOM nodes are reparented before their removal is observed; heap
//! cycles report unreachable times in the future of the current event; and
//! objects can reappear after their unreachable record is already pending.
//! The tables here tolerate all of those while keeping every recorded time
//! monotone.

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::binary_stream::{self, TimedSiteRecord};
use crate::call_stack::CallStackShadow;
use crate::dom_forest::DomForest;
use crate::record::{
    AllocInfo, IidUpdateRecord, LastUseUnreachableInfo, ObjectId, ObjectType, GLOBAL_OBJECT_ID,
    UNKNOWN_TIME,
};
use crate::source_loc::{SourceLocId, SourceMap, Timer};
use crate::trace_sink::{AnalysisError, TraceEventSink};

/// Initial room for the dense info table and the IID-update log.
const INITIAL_TABLE_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// LifetimeSinks — the four borrowed output streams
// ---------------------------------------------------------------------------

/// Output sinks of one run. All four are borrowed for the analyzer's
/// lifetime and never closed by it; they are flushed once at end of
/// execution.
pub struct LifetimeSinks<'a> {
    /// Per-object JSON records, one line per flushed object.
    pub object_records: &'a mut dyn Write,
    /// Sorted last-use binary stream.
    pub last_use: &'a mut dyn Write,
    /// Sorted unreachable binary stream.
    pub unreachable: &'a mut dyn Write,
    /// Sorted IID-update binary stream.
    pub iid_updates: &'a mut dyn Write,
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// Configuration for one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Mirror the sorted binary passes as human-readable sections on the
    /// per-object text sink.
    pub debug: bool,
}

impl AnalysisConfig {
    pub fn debug() -> Self {
        Self { debug: true }
    }
}

// ---------------------------------------------------------------------------
// StreamingLifetimeAnalysis
// ---------------------------------------------------------------------------

pub struct StreamingLifetimeAnalysis<'a> {
    config: AnalysisConfig,
    source_map: Option<&'a SourceMap>,
    /// Allocation data per currently-live object.
    live: BTreeMap<ObjectId, AllocInfo>,
    /// Allocation data per object declared unreachable but not yet flushed.
    unreachable: BTreeMap<ObjectId, AllocInfo>,
    /// Dense use/unreachability table indexed by object id, `None`-padded.
    info: Vec<Option<LastUseUnreachableInfo>>,
    iid_updates: Vec<IidUpdateRecord>,
    call_stack: CallStackShadow,
    dom: DomForest,
    sinks: LifetimeSinks<'a>,
}

impl<'a> StreamingLifetimeAnalysis<'a> {
    pub fn new(sinks: LifetimeSinks<'a>) -> Self {
        Self::with_config(sinks, AnalysisConfig::default())
    }

    pub fn with_config(sinks: LifetimeSinks<'a>, config: AnalysisConfig) -> Self {
        Self {
            config,
            source_map: None,
            live: BTreeMap::new(),
            unreachable: BTreeMap::new(),
            info: Vec::with_capacity(INITIAL_TABLE_CAPACITY),
            iid_updates: Vec::with_capacity(INITIAL_TABLE_CAPACITY),
            call_stack: CallStackShadow::new(),
            dom: DomForest::new(),
            sinks,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn pending_unreachable_count(&self) -> usize {
        self.unreachable.len()
    }

    pub fn iid_update_count(&self) -> usize {
        self.iid_updates.len()
    }

    pub fn call_stack_depth(&self) -> usize {
        self.call_stack.depth()
    }

    pub fn dom_forest(&self) -> &DomForest {
        &self.dom
    }

    /// Use/unreachability data recorded so far for `object_id`. Slot order
    /// is by object id only until finalization sorts the table.
    pub fn use_info(&self, object_id: ObjectId) -> Option<&LastUseUnreachableInfo> {
        self.info.get(object_id as usize).and_then(Option::as_ref)
    }

    // -- Table maintenance --

    fn use_info_mut(&mut self, object_id: ObjectId) -> &mut LastUseUnreachableInfo {
        debug_assert!(object_id >= 0, "object ids are non-negative");
        let index = object_id as usize;
        if index >= self.info.len() {
            self.info.resize_with(index + 1, || None);
        }
        self.info[index].get_or_insert_with(|| LastUseUnreachableInfo::new(object_id))
    }

    /// Sole writer of the most-recent-use pair. DOM liveness can have pushed
    /// the recorded use past `time`, so only a strictly later time writes,
    /// and the site always advances together with the time.
    fn update_most_recent_use(
        &mut self,
        object_id: ObjectId,
        time: u64,
        site: SourceLocId,
    ) -> &mut LastUseUnreachableInfo {
        let info = self.use_info_mut(object_id);
        if info.most_recent_use_time < time {
            info.most_recent_use_time = time;
            info.most_recent_use_site = site;
        }
        info
    }

    // -- Record emission --

    fn write_object_record(
        &mut self,
        object_id: ObjectId,
        alloc: &AllocInfo,
    ) -> Result<(), AnalysisError> {
        let source_map = self.source_map.ok_or(AnalysisError::SourceMapMissing)?;
        let fallback = LastUseUnreachableInfo::new(object_id);
        let use_info = self
            .info
            .get(object_id as usize)
            .and_then(Option::as_ref)
            .unwrap_or(&fallback);
        let call_stack: Vec<String> = alloc
            .creation_call_stack
            .iter()
            .map(|&site| source_map.resolve(site))
            .collect();
        let record = (
            object_id,
            alloc.object_type.as_str(),
            source_map.resolve(alloc.allocation_site),
            alloc.creation_time,
            call_stack,
            use_info.most_recent_use_time,
            source_map.resolve(use_info.most_recent_use_site),
            use_info.unreachable_time,
            source_map.resolve(use_info.unreachable_site),
        );
        serde_json::to_writer(&mut *self.sinks.object_records, &record)?;
        self.sinks.object_records.write_all(b"\n")?;
        Ok(())
    }

    /// Emit one combined record per pending-unreachable object, then clear
    /// the table. Revived-and-collected-again objects get a fresh record on
    /// the next flush.
    fn flush_unreachable(&mut self) -> Result<(), AnalysisError> {
        let pending = std::mem::take(&mut self.unreachable);
        for (object_id, alloc) in pending {
            self.write_object_record(object_id, &alloc)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event handling
// ---------------------------------------------------------------------------

impl<'a> TraceEventSink<'a> for StreamingLifetimeAnalysis<'a> {
    fn init(&mut self, _timer: &'a Timer, source_map: &'a SourceMap) -> Result<(), AnalysisError> {
        self.source_map = Some(source_map);
        Ok(())
    }

    fn create(
        &mut self,
        site: SourceLocId,
        object_id: ObjectId,
        time: u64,
        is_dom: bool,
    ) -> Result<(), AnalysisError> {
        if object_id == GLOBAL_OBJECT_ID {
            return Ok(());
        }
        let object_type = if is_dom {
            ObjectType::Dom
        } else {
            ObjectType::Object
        };
        // Overwrites any previous entry: a reused id is a revival.
        self.live.insert(
            object_id,
            AllocInfo::new(object_type, site, time, self.call_stack.snapshot()),
        );
        self.update_most_recent_use(object_id, time, site);
        Ok(())
    }

    fn create_fun(
        &mut self,
        site: SourceLocId,
        object_id: ObjectId,
        prototype_id: ObjectId,
        _enter_site: SourceLocId,
        _closure_names: &std::collections::BTreeSet<String>,
        time: u64,
    ) -> Result<(), AnalysisError> {
        let call_stack = self.call_stack.snapshot();
        self.live.insert(
            object_id,
            AllocInfo::new(ObjectType::Function, site, time, call_stack.clone()),
        );
        self.update_most_recent_use(object_id, time, site);
        self.live.insert(
            prototype_id,
            AllocInfo::new(ObjectType::Prototype, site, time, call_stack),
        );
        self.update_most_recent_use(prototype_id, time, site);
        Ok(())
    }

    fn last_use(
        &mut self,
        object_id: ObjectId,
        site: SourceLocId,
        time: u64,
    ) -> Result<(), AnalysisError> {
        if object_id == GLOBAL_OBJECT_ID {
            return Ok(());
        }
        let info = self.update_most_recent_use(object_id, time, site);
        if info.unreachable_time > UNKNOWN_TIME && info.unreachable_time < time {
            // A use after the recorded unreachable time disproves that
            // claim, and no further unreachability callback is guaranteed
            // (the object may be used without any reference being stored).
            // Conservatively move unreachability up to this use.
            info.unreachable_time = time;
            info.unreachable_site = site;
        }
        Ok(())
    }

    fn unreachable_object(
        &mut self,
        site: SourceLocId,
        object_id: ObjectId,
        time: u64,
        _shallow_size: u64,
    ) -> Result<(), AnalysisError> {
        {
            let info = self.use_info_mut(object_id);
            // Heap cycles plus native code can leave the recorded
            // unreachable time in the future of this event; keep the
            // greater value.
            if info.unreachable_time < time {
                info.unreachable_time = time;
                info.unreachable_site = site;
            }
        }
        if self.dom.remove(object_id) {
            // Still attached to the live DOM, so this point is its last use.
            let info = self.use_info_mut(object_id);
            info.most_recent_use_time = time;
            info.most_recent_use_site = site;
        }
        let alloc = if let Some(alloc) = self.live.remove(&object_id) {
            alloc
        } else if let Some(alloc) = self.unreachable.remove(&object_id) {
            // Revived and collected again before the pending record was
            // flushed; keep the original allocation data.
            alloc
        } else {
            // First sighting of the object, e.g. the document root.
            AllocInfo::synthesized_dom()
        };
        self.unreachable.insert(object_id, alloc);
        Ok(())
    }

    fn update_iid(
        &mut self,
        object_id: ObjectId,
        new_site: SourceLocId,
    ) -> Result<(), AnalysisError> {
        let alloc = self
            .live
            .get_mut(&object_id)
            .ok_or(AnalysisError::UpdateIidUnknownObject { object_id })?;
        alloc.allocation_site = new_site;
        alloc.creation_call_stack = self.call_stack.snapshot();
        self.iid_updates.push(IidUpdateRecord {
            object_id,
            creation_time: alloc.creation_time,
            new_site,
        });
        Ok(())
    }

    fn function_enter(
        &mut self,
        _site: SourceLocId,
        _function_id: ObjectId,
        call_site: SourceLocId,
        _time: u64,
    ) -> Result<(), AnalysisError> {
        self.call_stack.push(call_site);
        Ok(())
    }

    fn function_exit(&mut self, _site: SourceLocId, _time: u64) -> Result<(), AnalysisError> {
        self.call_stack
            .pop()
            .map(|_| ())
            .ok_or(AnalysisError::CallStackUnderflow)
    }

    fn add_dom_child(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        _time: u64,
    ) -> Result<(), AnalysisError> {
        if self.dom.attach(parent, child)? {
            // Attachment proves the child is live; revive it if the trace
            // never allocated it or already collected it.
            self.live
                .entry(child)
                .or_insert_with(AllocInfo::synthesized_dom);
        }
        Ok(())
    }

    fn remove_dom_child(
        &mut self,
        parent: ObjectId,
        child: ObjectId,
        time: u64,
    ) -> Result<(), AnalysisError> {
        for node in self.dom.detach(parent, child)? {
            let info = self.use_info_mut(node);
            info.most_recent_use_time = time;
            info.most_recent_use_site = SourceLocId::REMOVE_FROM_DOM;
        }
        Ok(())
    }

    fn dom_root(&mut self, node: ObjectId) -> Result<(), AnalysisError> {
        self.dom.add_root(node);
        Ok(())
    }

    fn end_last_use(&mut self) -> Result<(), AnalysisError> {
        self.flush_unreachable()
    }

    fn end_execution(&mut self, _time: u64) -> Result<(), AnalysisError> {
        if !self.live.is_empty() {
            return Err(AnalysisError::LiveObjectsAtEnd {
                count: self.live.len(),
            });
        }
        self.flush_unreachable()?;
        let source_map = self.source_map;

        // Last-use pass: populated entries by ascending use time; never-used
        // and empty slots sort to the back and are not emitted.
        self.info.sort_unstable_by_key(|slot| match slot {
            Some(info) if info.most_recent_use_time != UNKNOWN_TIME => {
                (false, info.most_recent_use_time)
            }
            _ => (true, 0),
        });
        if self.config.debug {
            self.sinks.object_records.write_all(b"last use\n")?;
        }
        for slot in &self.info {
            let Some(info) = slot else { break };
            if info.most_recent_use_time == UNKNOWN_TIME {
                break;
            }
            if self.config.debug {
                let map = source_map.ok_or(AnalysisError::SourceMapMissing)?;
                let row = (
                    info.object_id,
                    info.most_recent_use_time,
                    map.resolve(info.most_recent_use_site),
                );
                serde_json::to_writer(&mut *self.sinks.object_records, &row)?;
                self.sinks.object_records.write_all(b"\n")?;
            }
            binary_stream::write_timed_site(
                &mut *self.sinks.last_use,
                &TimedSiteRecord {
                    object_id: info.object_id,
                    time: info.most_recent_use_time,
                    site: info.most_recent_use_site,
                },
            )?;
        }

        // Unreachable pass: every populated entry by ascending unreachable
        // time, zero or not; empty slots sort to the back.
        self.info.sort_unstable_by_key(|slot| match slot {
            Some(info) => (false, info.unreachable_time),
            None => (true, 0),
        });
        if self.config.debug {
            self.sinks.object_records.write_all(b"unreachable\n")?;
        }
        for slot in &self.info {
            let Some(info) = slot else { break };
            if self.config.debug {
                let map = source_map.ok_or(AnalysisError::SourceMapMissing)?;
                let row = (
                    info.object_id,
                    info.unreachable_time,
                    map.resolve(info.unreachable_site),
                );
                serde_json::to_writer(&mut *self.sinks.object_records, &row)?;
                self.sinks.object_records.write_all(b"\n")?;
            }
            binary_stream::write_timed_site(
                &mut *self.sinks.unreachable,
                &TimedSiteRecord {
                    object_id: info.object_id,
                    time: info.unreachable_time,
                    site: info.unreachable_site,
                },
            )?;
        }

        // IID-update pass: ordered by the (unemitted) creation time.
        self.iid_updates.sort_unstable_by_key(|rec| rec.creation_time);
        for record in &self.iid_updates {
            binary_stream::write_iid_update(&mut *self.sinks.iid_updates, record)?;
        }

        self.sinks.object_records.flush()?;
        self.sinks.last_use.flush()?;
        self.sinks.unreachable.flush()?;
        self.sinks.iid_updates.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
