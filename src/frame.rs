//! The frame interner: deduplicates call-stack chains into a compact,
//! `u32`-indexed forest so a sample only ever stores one integer.
//!
//! The host's execution frames are never touched directly by this crate;
//! [`StackSource`] is the seam a host-binding layer implements to expose
//! its interpreter's current call stack.

use std::collections::HashMap;

/// One raw frame as reported by the host interpreter, innermost details
/// about a single call-stack entry with no knowledge of its position in the
/// chain.
pub struct RawFrame<'a> {
    pub file_name: &'a str,
    pub line: u32,
    /// Nonzero for closures: the line the closure literal itself starts on.
    pub closure_line: u32,
    pub class_name: Option<&'a str>,
    pub function_name: Option<&'a str>,
    /// `false` for VM-internal frames (builtins, opcode handlers) that
    /// should not appear in the interned chain at all.
    pub is_user_code: bool,
}

/// A host's execution call stack, walkable from the currently executing
/// (innermost) frame outward to the entry point.
pub trait StackSource {
    fn frames(&self) -> Box<dyn Iterator<Item = RawFrame<'_>> + '_>;
}

/// One node of the interned call-chain forest. `parent_id == 0` means "no
/// parent" (a root).
#[derive(Debug, Clone)]
pub struct Frame {
    pub file_name: Box<str>,
    pub line: u32,
    pub closure_line: u32,
    pub class_name: Option<Box<str>>,
    pub function_name: Option<Box<str>>,
    pub parent_id: u32,
}

const TRUNCATION_FILE: &str = "stacksample fake file";
const TRUNCATION_FUNCTION: &str = "stacksample_truncated";

#[derive(Default)]
pub struct FrameInterner {
    // Frame id `n` (n >= 1) lives at index `n - 1`; id 0 is the implicit
    // "no parent" root and has no entry here.
    frames: Vec<Frame>,
    reverse_index: HashMap<Box<[u8]>, u32>,
}

impl FrameInterner {
    pub fn new() -> FrameInterner {
        FrameInterner {
            frames: Vec::new(),
            reverse_index: HashMap::new(),
        }
    }

    pub fn get_frame(&self, id: u32) -> Option<&Frame> {
        if id == 0 {
            return None;
        }
        self.frames.get((id - 1) as usize)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Interns one call-chain link. Only `file`, `line`, and `parent_id`
    /// participate in the dedup key: identical source-location chains
    /// collapse to one id even if reached through differently-named
    /// methods, and conversely a method/free-function disambiguation is
    /// carried entirely by the parent chain, never by name.
    pub fn intern(
        &mut self,
        file: &str,
        line: u32,
        parent_id: u32,
        class_name: Option<&str>,
        function_name: Option<&str>,
        closure_line: u32,
    ) -> u32 {
        let key = composite_key(file, line, parent_id);
        if let Some(&id) = self.reverse_index.get(key.as_slice()) {
            return id;
        }
        self.frames.push(Frame {
            file_name: file.into(),
            line,
            closure_line,
            class_name: class_name.map(Into::into),
            function_name: function_name.map(Into::into),
            parent_id,
        });
        let id = self.frames.len() as u32;
        self.reverse_index.insert(key.into_boxed_slice(), id);
        id
    }

    /// Interns (lazily, on first use) the sentinel frame that replaces a
    /// call chain's clipped parents when it exceeds `max_depth`.
    pub fn truncation_marker(&mut self) -> u32 {
        self.intern(TRUNCATION_FILE, 1, 0, None, Some(TRUNCATION_FUNCTION), 0)
    }

    /// Interns `source`'s current call chain, honoring `max_depth` (0 means
    /// unlimited), and returns the id of the innermost frame — which, via
    /// its `parent_id` chain, represents the whole stack.
    ///
    /// VM-internal frames (`is_user_code == false`) are skipped entirely:
    /// they neither get their own frame id nor count toward `max_depth`:
    /// the next real frame simply adopts whatever parent id was current.
    pub fn walk_stack(&mut self, source: &dyn StackSource, max_depth: u32) -> u32 {
        let mut real: Vec<RawFrame> = source.frames().filter(|f| f.is_user_code).collect();
        // `source.frames()` yields innermost-to-outermost; interning needs
        // outermost-to-innermost so each frame's parent is already interned.
        real.reverse();

        let n = real.len();
        if n == 0 {
            return 0;
        }

        let mut parent_id = 0u32;
        let mut start = 0usize;
        if max_depth > 0 && n > max_depth as usize {
            start = n - max_depth as usize;
            parent_id = self.truncation_marker();
        }

        for frame in &real[start..] {
            parent_id = self.intern(
                frame.file_name,
                frame.line,
                parent_id,
                frame.class_name,
                frame.function_name,
                frame.closure_line,
            );
        }
        parent_id
    }
}

fn composite_key(file: &str, line: u32, parent_id: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(file.len() + 24);
    key.extend_from_slice(file.as_bytes());
    key.push(0);
    key.extend_from_slice(line.to_string().as_bytes());
    key.push(0);
    key.extend_from_slice(parent_id.to_string().as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStack(Vec<(&'static str, u32, Option<&'static str>, bool)>);

    impl StackSource for FixedStack {
        fn frames(&self) -> Box<dyn Iterator<Item = RawFrame<'_>> + '_> {
            Box::new(self.0.iter().map(|&(file, line, function, is_user_code)| {
                RawFrame {
                    file_name: file,
                    line,
                    closure_line: 0,
                    class_name: None,
                    function_name: function,
                    is_user_code,
                }
            }))
        }
    }

    #[test]
    fn identical_chains_dedupe() {
        let mut interner = FrameInterner::new();
        let id1 = interner.intern("a.src", 1, 0, None, Some("f"), 0);
        let id2 = interner.intern("a.src", 1, 0, None, Some("g"), 0);
        assert_eq!(id1, id2, "class/function must not affect the dedup key");
    }

    #[test]
    fn different_parent_chains_do_not_dedupe() {
        let mut interner = FrameInterner::new();
        let root1 = interner.intern("a.src", 1, 0, None, Some("f"), 0);
        let root2 = interner.intern("b.src", 1, 0, None, Some("f"), 0);
        let leaf1 = interner.intern("c.src", 2, root1, None, Some("g"), 0);
        let leaf2 = interner.intern("c.src", 2, root2, None, Some("g"), 0);
        assert_ne!(leaf1, leaf2);
    }

    #[test]
    fn truncation_marker_is_lazy_and_singular() {
        let mut interner = FrameInterner::new();
        assert_eq!(interner.len(), 0);
        let a = interner.truncation_marker();
        let b = interner.truncation_marker();
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn walk_stack_full_chain_innermost_first_to_outer() {
        // Stack from frames(): innermost first.
        let stack = FixedStack(vec![
            ("a.src", 3, Some("inner"), true),
            ("a.src", 2, Some("middle"), true),
            ("a.src", 1, Some("outer"), true),
        ]);
        let mut interner = FrameInterner::new();
        let leaf = interner.walk_stack(&stack, 0);
        let leaf_frame = interner.get_frame(leaf).unwrap();
        assert_eq!(leaf_frame.line, 3);
        let middle = interner.get_frame(leaf_frame.parent_id).unwrap();
        assert_eq!(middle.line, 2);
        let outer = interner.get_frame(middle.parent_id).unwrap();
        assert_eq!(outer.line, 1);
        assert_eq!(outer.parent_id, 0);
    }

    #[test]
    fn vm_builtin_frames_are_skipped_but_do_not_break_chain() {
        let stack = FixedStack(vec![
            ("a.src", 3, Some("inner"), true),
            ("<builtin>", 0, Some("array_map"), false),
            ("a.src", 1, Some("outer"), true),
        ]);
        let mut interner = FrameInterner::new();
        let leaf = interner.walk_stack(&stack, 0);
        let leaf_frame = interner.get_frame(leaf).unwrap();
        let outer = interner.get_frame(leaf_frame.parent_id).unwrap();
        assert_eq!(outer.line, 1);
        assert_eq!(outer.parent_id, 0);
    }

    #[test]
    fn truncates_to_innermost_frames_with_marker_as_outer_parent() {
        let stack = FixedStack(vec![
            ("a.src", 5, Some("f5"), true),
            ("a.src", 4, Some("f4"), true),
            ("a.src", 3, Some("f3"), true),
            ("a.src", 2, Some("f2"), true),
            ("a.src", 1, Some("f1"), true),
        ]);
        let mut interner = FrameInterner::new();
        let leaf = interner.walk_stack(&stack, 2);

        let leaf_frame = interner.get_frame(leaf).unwrap();
        assert_eq!(leaf_frame.line, 5);
        let outer_kept = interner.get_frame(leaf_frame.parent_id).unwrap();
        assert_eq!(outer_kept.line, 4);
        assert_eq!(
            outer_kept.parent_id,
            interner.truncation_marker(),
            "the outermost kept frame's parent must be the truncation marker"
        );
    }
}
