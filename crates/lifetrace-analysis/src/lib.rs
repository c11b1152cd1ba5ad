#![forbid(unsafe_code)]

//! Streaming last-use and unreachability analysis over the memory-event
//! trace of an instrumented script runtime.
//!
//! The trace driver dispatches events into [`trace_sink::TraceEventSink`];
//! [`lifetime_analysis::StreamingLifetimeAnalysis`] is the single-pass
//! engine behind it, emitting one per-object JSON stream and three sorted
//! binary streams that extend the original trace into an enhanced trace for
//! staleness analysis.

pub mod binary_stream;
pub mod call_stack;
pub mod dom_forest;
pub mod lifetime_analysis;
pub mod record;
pub mod source_loc;
pub mod trace_sink;
