//! The append-only sample log: a sequence of `(frame_id, overrun_count,
//! timestamp_ns)` entries backed by a single [`FrameInterner`].

use crate::export::aggregate::FunctionStats;
use crate::export::speedscope::SpeedscopeData;
use crate::frame::{Frame, FrameInterner, StackSource};

#[derive(Debug, Clone, Copy)]
pub struct SampleEntry {
    pub frame_id: u32,
    pub overrun_count: i64,
    pub timestamp_ns: u64,
}

/// One call-stack frame as reported back out of a trace, detached from the
/// interner so callers can hold it without borrowing the `Log`.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub file_name: Box<str>,
    pub line: u32,
    pub closure_line: u32,
    pub class_name: Option<Box<str>>,
    pub function_name: Option<Box<str>>,
}

pub struct Log {
    entries: Vec<SampleEntry>,
    interner: FrameInterner,
    /// 0 means unlimited.
    pub max_depth: u32,
    pub epoch_ns: u64,
    pub period_ns: u64,
    total_event_count: i64,
}

impl Log {
    pub fn new(max_depth: u32, epoch_ns: u64, period_ns: u64) -> Log {
        Log {
            entries: Vec::new(),
            interner: FrameInterner::new(),
            max_depth,
            epoch_ns,
            period_ns,
            total_event_count: 0,
        }
    }

    /// Interns `source`'s current call chain and appends a sample.
    pub fn add(&mut self, source: &dyn StackSource, overrun_count: i64, timestamp_ns: u64) {
        let frame_id = self.interner.walk_stack(source, self.max_depth);
        self.entries.push(SampleEntry {
            frame_id,
            overrun_count,
            timestamp_ns,
        });
        self.total_event_count += overrun_count;
    }

    /// A fresh, empty log carrying this one's `max_depth`/`epoch_ns`/
    /// `period_ns` forward. Used when a profiler flushes.
    pub fn copy_options(&self) -> Log {
        Log::new(self.max_depth, self.epoch_ns, self.period_ns)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn event_count(&self) -> i64 {
        self.total_event_count
    }

    pub fn get_entry(&self, index: usize) -> Option<LogEntry<'_>> {
        self.entries
            .get(index)
            .map(|entry| LogEntry { log: self, entry })
    }

    pub fn get_frame(&self, id: u32) -> Option<&Frame> {
        self.interner.get_frame(id)
    }

    pub(crate) fn entries(&self) -> &[SampleEntry] {
        &self.entries
    }

    pub(crate) fn frame_chain(&self, frame_id: u32) -> Vec<&Frame> {
        let mut chain = Vec::new();
        let mut current = frame_id;
        while current != 0 {
            let Some(frame) = self.interner.get_frame(current) else {
                break;
            };
            chain.push(frame);
            current = frame.parent_id;
        }
        chain
    }

    /// Folded-stack text: one line per distinct call chain, outer frame
    /// first, `<chain> <count>\n`. See [`crate::export::folded`].
    pub fn format_collapsed(&self) -> String {
        crate::export::folded::format_collapsed(self)
    }

    /// The structured "sampled profile" shape speedscope.app and similar
    /// flamegraph viewers consume. See [`crate::export::speedscope`].
    pub fn speedscope_data(&self) -> SpeedscopeData {
        crate::export::speedscope::speedscope_data(self)
    }

    /// [`Self::speedscope_data`] serialized to the JSON text third-party
    /// viewers read directly.
    pub fn speedscope_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.speedscope_data())
    }

    /// Per-function inclusive/self aggregation. See
    /// [`crate::export::aggregate`].
    pub fn aggregate_by_function(&self) -> Vec<(String, FunctionStats)> {
        crate::export::aggregate::aggregate_by_function(self)
    }
}

pub struct LogEntry<'a> {
    log: &'a Log,
    entry: &'a SampleEntry,
}

impl<'a> LogEntry<'a> {
    pub fn event_count(&self) -> i64 {
        self.entry.overrun_count
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.entry.timestamp_ns
    }

    /// Wall-clock timestamp derived from the log's `epoch_ns` baseline plus
    /// this sample's monotonic offset from it.
    pub fn timestamp_seconds_since_epoch(&self) -> f64 {
        (self.log.epoch_ns as f64 + self.entry.timestamp_ns as f64) / 1e9
    }

    /// The call chain, innermost frame first (the opposite order from the
    /// exporters, matching spec §6's note about stack-trace-format
    /// compatibility).
    pub fn trace(&self) -> Vec<TraceFrame> {
        self.log
            .frame_chain(self.entry.frame_id)
            .into_iter()
            .map(|frame| TraceFrame {
                file_name: frame.file_name.clone(),
                line: frame.line,
                closure_line: frame.closure_line,
                class_name: frame.class_name.clone(),
                function_name: frame.function_name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;

    struct FixedStack(Vec<&'static str>);

    impl StackSource for FixedStack {
        fn frames(&self) -> Box<dyn Iterator<Item = RawFrame<'_>> + '_> {
            Box::new(self.0.iter().enumerate().map(|(i, &file)| RawFrame {
                file_name: file,
                line: (i + 1) as u32,
                closure_line: 0,
                class_name: None,
                function_name: Some("f"),
                is_user_code: true,
            }))
        }
    }

    #[test]
    fn add_grows_log_and_is_append_only() {
        let mut log = Log::new(0, 0, 10_000_000);
        let stack = FixedStack(vec!["a.src"]);
        log.add(&stack, 1, 100);
        log.add(&stack, 2, 200);
        assert_eq!(log.size(), 2);
        assert_eq!(log.event_count(), 3);
        let first = log.get_entry(0).unwrap();
        assert_eq!(first.event_count(), 1);
        assert_eq!(first.timestamp_ns(), 100);
    }

    #[test]
    fn out_of_range_index_returns_none_without_mutation() {
        let log = Log::new(0, 0, 0);
        assert!(log.get_entry(0).is_none());
        assert_eq!(log.size(), 0);
    }

    #[test]
    fn copy_options_carries_forward_but_starts_empty() {
        let mut log = Log::new(3, 42, 10_000_000);
        log.add(&FixedStack(vec!["a.src"]), 1, 0);
        let fresh = log.copy_options();
        assert_eq!(fresh.max_depth, 3);
        assert_eq!(fresh.epoch_ns, 42);
        assert_eq!(fresh.period_ns, 10_000_000);
        assert_eq!(fresh.size(), 0);
    }

    #[test]
    fn trace_is_innermost_to_outermost() {
        let mut log = Log::new(0, 0, 0);
        // innermost first, per FixedStack's frames() order
        log.add(&FixedStack(vec!["inner.src", "outer.src"]), 1, 0);
        let trace = log.get_entry(0).unwrap().trace();
        assert_eq!(&*trace[0].file_name, "inner.src");
        assert_eq!(&*trace[1].file_name, "outer.src");
    }
}
