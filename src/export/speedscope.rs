//! The structured "sampled profile" export, consumed by speedscope.app and
//! other third-party flamegraph viewers. The schema is bit-exact: field
//! names, nesting, and the `$schema`/`exporter` constants must match exactly
//! for those viewers to load the file.

use std::collections::HashMap;

use serde::Serialize;

use crate::export::{render_name, sanitize};
use crate::log::Log;

#[derive(Serialize)]
pub struct SpeedscopeData {
    #[serde(rename = "$schema")]
    pub schema: &'static str,
    pub exporter: &'static str,
    pub shared: Shared,
    pub profiles: Vec<Profile>,
}

#[derive(Serialize)]
pub struct Shared {
    pub frames: Vec<FrameInfo>,
}

#[derive(Serialize)]
pub struct FrameInfo {
    pub name: String,
    /// `None` only for the unreachable id-0 sentinel; every real frame has a
    /// file name. Deliberately omits `line`: including it fragments a single
    /// function into many speedscope frames whenever it recurses across
    /// several call sites.
    pub file: String,
}

#[derive(Serialize)]
pub struct Profile {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    #[serde(rename = "startValue")]
    pub start_value: u64,
    #[serde(rename = "endValue")]
    pub end_value: u64,
    pub samples: Vec<Vec<u32>>,
    pub weights: Vec<i64>,
}

/// Builds the speedscope document for `log`.
///
/// `shared.frames` is deduplicated by `(rendered_name, file)`, independent
/// from the call-chain dedup `FrameInterner` performs: two distinct
/// call-chain frame ids that render identically (same name, same file)
/// collapse to one entry here, and the per-sample stacks index into this
/// smaller, re-deduplicated array.
pub fn speedscope_data(log: &Log) -> SpeedscopeData {
    let mut frames: Vec<FrameInfo> = Vec::new();
    let mut frame_index_by_key: HashMap<(String, String), u32> = HashMap::new();
    let mut samples: Vec<Vec<u32>> = Vec::with_capacity(log.size());
    let mut weights: Vec<i64> = Vec::with_capacity(log.size());

    let mut first_ts: Option<u64> = None;
    let mut last_ts: u64 = 0;

    for entry in log.entries() {
        if first_ts.is_none() {
            first_ts = Some(entry.timestamp_ns);
        }
        last_ts = entry.timestamp_ns;

        let chain = log.frame_chain(entry.frame_id);
        let mut stack: Vec<u32> = Vec::with_capacity(chain.len());
        for frame in chain.iter().rev() {
            let name = sanitize(&render_name(frame));
            let key = (name.clone(), frame.file_name.to_string());
            let index = *frame_index_by_key.entry(key).or_insert_with(|| {
                let index = frames.len() as u32;
                frames.push(FrameInfo {
                    name: name.clone(),
                    file: frame.file_name.to_string(),
                });
                index
            });
            stack.push(index);
        }
        samples.push(stack);
        weights.push(entry.overrun_count * log.period_ns as i64);
    }

    let end_value = last_ts.saturating_sub(first_ts.unwrap_or(0));

    SpeedscopeData {
        schema: "https://www.speedscope.app/file-format-schema.json",
        // Third-party viewers key off this literal value; it is a wire
        // constant, not a name this crate otherwise uses for itself.
        exporter: "Excimer",
        shared: Shared { frames },
        profiles: vec![Profile {
            kind: "sampled",
            name: "",
            unit: "nanoseconds",
            start_value: 0,
            end_value,
            samples,
            weights,
        }],
    }
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
    fn sample_stack_depth_matches_chain_and_weight_is_count_times_period() {
        let mut log = Log::new(0, 0, 10_000_000);
        log.add(&FixedStack(vec!["inner", "outer"]), 3, 100);

        let data = speedscope_data(&log);
        let profile = &data.profiles[0];
        assert_eq!(profile.samples[0].len(), 2);
        assert_eq!(profile.weights[0], 3 * 10_000_000);
    }

    #[test]
    fn distinct_chain_ids_with_identical_render_collapse_in_shared_frames() {
        // Two call chains that differ only by an intervening frame which
        // renders identically at the leaf still produce one leaf frame id in
        // `frame`'s dedup (different parent), but should collapse to one
        // shared-frame entry here since name+file match.
        let mut log = Log::new(0, 0, 1);
        log.add(&FixedStack(vec!["leaf", "a"]), 1, 0);
        log.add(&FixedStack(vec!["leaf", "b"]), 1, 0);

        let data = speedscope_data(&log);
        let leaf_frame_indices: Vec<u32> =
            data.profiles[0].samples.iter().map(|s| s[0]).collect();
        assert_eq!(leaf_frame_indices[0], leaf_frame_indices[1]);
    }

    #[test]
    fn start_value_is_always_zero_and_end_value_is_span() {
        let mut log = Log::new(0, 0, 1);
        log.add(&FixedStack(vec!["a"]), 1, 100);
        log.add(&FixedStack(vec!["a"]), 1, 250);
        let data = speedscope_data(&log);
        assert_eq!(data.profiles[0].start_value, 0);
        assert_eq!(data.profiles[0].end_value, 150);
    }

    #[test]
    fn frame_names_are_sanitized_like_the_folded_exporter() {
        let mut log = Log::new(0, 0, 1);
        log.add(&FixedStack(vec!["has space"]), 1, 0);
        let data = speedscope_data(&log);
        assert_eq!(data.shared.frames[0].name, "has_space");
    }
}
