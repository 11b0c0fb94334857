/// A domain event describing a fact that already happened.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **self-describing** (carry enough context for an audit line)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "invoice_created").
    fn event_type(&self) -> &'static str;

    /// Human-readable one-line description for the activity log.
    fn describe(&self) -> String;
}
