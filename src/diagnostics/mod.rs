// Diagnostics module
// Persists classifier decisions for offline tuning

pub mod trace;

pub use trace::{read_trace_file, TraceEntry, TraceError, TraceWriter};
