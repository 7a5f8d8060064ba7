//! The handle for one in-flight admission.

use crate::resource::ResourceWrapper;

/// Returned by a successful admission; must be passed back to
/// [`Context::exit`](crate::context::Context::exit) exactly once, in LIFO
/// order within its context.
///
/// Deliberately neither `Clone` nor `Copy`: consuming it on exit is what
/// makes double exits unrepresentable.
#[must_use = "an admitted entry must be exited"]
#[derive(Debug)]
pub struct Entry {
    context_id: u64,
    seq: u64,
    resource: ResourceWrapper,
    count: u32,
    created_ms: u64,
    queued_ms: Option<u64>,
}

impl Entry {
    pub(crate) fn new(
        context_id: u64,
        seq: u64,
        resource: ResourceWrapper,
        count: u32,
        created_ms: u64,
        queued_ms: Option<u64>,
    ) -> Self {
        Self {
            context_id,
            seq,
            resource,
            count,
            created_ms,
            queued_ms,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &ResourceWrapper {
        &self.resource
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    /// How long this admission waited in priority occupancy, `None` when it
    /// was admitted straight away.
    #[must_use]
    pub fn queued_ms(&self) -> Option<u64> {
        self.queued_ms
    }

    pub(crate) fn context_id(&self) -> u64 {
        self.context_id
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }
}
