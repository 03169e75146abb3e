//! Folded-stack text export: one line per distinct call chain, each line
//! `frame1;frame2;...;frameN <count>\n`, outer frame first.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::export::{render_name, sanitize};
use crate::log::Log;

/// Renders every sample in `log` as folded-stack text, summing counts for
/// samples that share an identical rendered chain.
///
/// Iteration order over distinct chains is a `HashMap`'s, i.e. unspecified
/// but stable within one call; only the per-chain sum is a contract.
pub fn format_collapsed(log: &Log) -> String {
    let mut totals: HashMap<String, i64> = HashMap::new();

    for entry in log.entries() {
        let chain: Vec<&crate::frame::Frame> = log.frame_chain(entry.frame_id);
        let mut line = String::new();
        for (i, frame) in chain.iter().rev().enumerate() {
            if i > 0 {
                line.push(';');
            }
            line.push_str(&sanitize(&render_name(frame)));
        }
        *totals.entry(line).or_insert(0) += entry.overrun_count;
    }

    let mut out = String::new();
    for (chain, count) in &totals {
        let _ = writeln!(out, "{chain} {count}");
    }
    out
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
    fn sums_counts_for_identical_chains() {
        let mut log = Log::new(0, 0, 0);
        // frames() yields innermost-first; [A] then [B, A] means A alone,
        // and A called from B.
        log.add(&FixedStack(vec!["A"]), 1, 0);
        log.add(&FixedStack(vec!["B", "A"]), 1, 0);
        log.add(&FixedStack(vec!["B", "A"]), 1, 0);

        let text = format_collapsed(&log);
        let total: i64 = text
            .lines()
            .map(|line| line.rsplit(' ').next().unwrap().parse::<i64>().unwrap())
            .sum();
        assert_eq!(total, 3);
        assert!(text.contains("A 1\n"));
        assert!(text.contains("A;B 2\n"));
    }

    #[test]
    fn spaces_and_nuls_become_underscores() {
        let mut log = Log::new(0, 0, 0);
        log.add(&FixedStack(vec!["has space"]), 1, 0);
        let text = format_collapsed(&log);
        assert!(text.contains("has_space 1\n"));
    }
}
