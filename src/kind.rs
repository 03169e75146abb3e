/// Which clock a timer or profiler samples against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EventKind {
    /// Monotonic wall-clock time. Always available.
    #[default]
    Real = 0,
    /// Per-thread CPU time. Rejected at creation time on backends with no
    /// per-thread CPU clock (the kqueue backend).
    Cpu = 1,
}
