//! Per-function inclusive/self aggregation, the data behind a typical
//! "total time in this function" profiler view.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::export::render_name;
use crate::log::Log;

#[derive(Debug, Clone)]
pub struct FunctionStats {
    pub file_name: Box<str>,
    pub line: u32,
    pub closure_line: u32,
    pub class_name: Option<Box<str>>,
    pub function_name: Option<Box<str>>,
    /// Event count where this function was the innermost (currently
    /// executing) frame of the sample.
    pub self_count: i64,
    /// Event count of every sample whose chain contains this function,
    /// counted once per sample regardless of recursion depth.
    pub inclusive_count: i64,
}

/// Aggregates every sample in `log` by rendered function name, returning
/// entries sorted by `inclusive_count` descending (ties broken by
/// insertion/first-seen order; the ordering among ties is otherwise
/// unspecified).
pub fn aggregate_by_function(log: &Log) -> Vec<(String, FunctionStats)> {
    let mut order: Vec<String> = Vec::new();
    let mut result: HashMap<String, FunctionStats> = HashMap::new();

    for entry in log.entries() {
        let chain = log.frame_chain(entry.frame_id);
        // Recursive functions must count toward `inclusive_count` only once
        // per sample; this set is cleared at the end of every sample, not
        // once for the whole log.
        let mut seen_this_sample: HashSet<String> = HashSet::new();

        for (depth, frame) in chain.iter().enumerate() {
            let name = render_name(frame);
            let stats = result.entry(name.clone()).or_insert_with(|| {
                order.push(name.clone());
                FunctionStats {
                    file_name: frame.file_name.clone(),
                    line: frame.line,
                    closure_line: frame.closure_line,
                    class_name: frame.class_name.clone(),
                    function_name: frame.function_name.clone(),
                    self_count: 0,
                    inclusive_count: 0,
                }
            });

            if depth == 0 {
                stats.self_count += entry.overrun_count;
            }
            if seen_this_sample.insert(name) {
                stats.inclusive_count += entry.overrun_count;
            }
        }
    }

    let mut entries: Vec<(String, FunctionStats)> = order
        .into_iter()
        .map(|name| {
            let stats = result.remove(&name).expect("just inserted under this name");
            (name, stats)
        })
        .collect();
    entries.sort_by(|a, b| b.1.inclusive_count.cmp(&a.1.inclusive_count));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{RawFrame, StackSource};

    struct FixedStack(Vec<&'static str>);

    impl StackSource for FixedStack {
        fn frames(&self) -> Box<dyn Iterator<Item = RawFrame<'_>> + '_> {
            Box::new(self.0.iter().enumerate().map(|(i, &name)| RawFrame {
                file_name: "chain.src",
                line: (i + 1) as u32,
                closure_line: 0,
                class_name: None,
                function_name: Some(name),
                is_user_code: true,
            }))
        }
    }

    #[test]
    fn single_frame_atop_every_sample_has_equal_self_and_inclusive() {
        let mut log = Log::new(0, 0, 0);
        log.add(&FixedStack(vec!["f"]), 1, 0);
        log.add(&FixedStack(vec!["f"]), 2, 0);

        let agg = aggregate_by_function(&log);
        let (_, stats) = agg.iter().find(|(name, _)| name == "f").unwrap();
        assert_eq!(stats.self_count, log.event_count());
        assert_eq!(stats.inclusive_count, log.event_count());
    }

    #[test]
    fn non_innermost_frame_accrues_inclusive_but_not_self() {
        let mut log = Log::new(0, 0, 0);
        log.add(&FixedStack(vec!["inner", "outer"]), 5, 0);

        let agg = aggregate_by_function(&log);
        let (_, outer) = agg.iter().find(|(name, _)| name == "outer").unwrap();
        assert_eq!(outer.self_count, 0);
        assert_eq!(outer.inclusive_count, 5);
    }

    #[test]
    fn recursive_function_counts_inclusive_once_per_sample() {
        let mut log = Log::new(0, 0, 0);
        // "f" appears twice in one chain (recursion); inclusive must only
        // count the sample's event_count once, not twice.
        log.add(&FixedStack(vec!["f", "f"]), 3, 0);

        let agg = aggregate_by_function(&log);
        let (_, stats) = agg.iter().find(|(name, _)| name == "f").unwrap();
        assert_eq!(stats.inclusive_count, 3);
        assert_eq!(stats.self_count, 3);
    }

    #[test]
    fn sorted_by_inclusive_descending() {
        let mut log = Log::new(0, 0, 0);
        log.add(&FixedStack(vec!["hot"]), 10, 0);
        log.add(&FixedStack(vec!["cold", "hot"]), 1, 0);

        let agg = aggregate_by_function(&log);
        let positions: HashMap<&str, usize> = agg
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.as_str(), i))
            .collect();
        assert!(positions["hot"] < positions["cold"]);
    }
}
