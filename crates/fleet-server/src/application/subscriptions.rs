//! Per-connection subscription filters.
//!
//! Every streaming connection owns one [`SubscriptionFilter`].  A fresh
//! connection receives sensor events for all devices; a `subscribe` message
//! replaces the filter wholesale.  The filter applies to `sensor` events
//! only — `command_executed` notices are broadcast universally and never
//! consult it.

/// The set of device identifiers a connection wants sensor events for.
///
/// An empty set means "all devices", which is also the default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    device_ids: Vec<String>,
}

impl SubscriptionFilter {
    /// The default filter: receive sensor events for every device.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter limited to the given identifiers.  An empty list is
    /// equivalent to [`SubscriptionFilter::all`].
    pub fn limited_to(device_ids: Vec<String>) -> Self {
        Self { device_ids }
    }

    /// `true` when this filter passes everything through.
    pub fn is_all(&self) -> bool {
        self.device_ids.is_empty()
    }

    /// The fan-out rule: a sensor event for `device_id` is delivered iff the
    /// filter is empty or includes the id.
    pub fn wants(&self, device_id: &str) -> bool {
        self.device_ids.is_empty() || self.device_ids.iter().any(|id| id == device_id)
    }

    /// The identifiers this filter is limited to (empty = all).
    pub fn device_ids(&self) -> &[String] {
        &self.device_ids
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
