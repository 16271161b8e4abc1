//! Admission gate seam for the store's put path.

/// Decides whether a work item's label has already been admitted.
///
/// A gate is consulted once per non-forced `put`; the call both queries and
/// records admission, so the same label is admitted at most once per gate
/// lifetime. The segment store only depends on this trait — the bloom-filter
/// implementation lives with the queue core.
pub trait AdmissionGate: Send + Sync {
    /// Returns whether `label` had already been admitted, and marks it
    /// admitted going forward.
    fn check(&self, label: &str) -> bool;
}
