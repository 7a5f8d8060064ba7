//! Per-invocation ambient state.
//!
//! A [`Context`] represents one logical calling thread. Entries stack inside
//! it; the slot pipeline reads and writes the top of that stack while an
//! admission is in flight. Contexts are engine-scoped: re-entering the same
//! context name reuses the entrance node, and the shared root is the parent
//! of every entrance.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{BlockError, EngineError};
use crate::node::{DefaultNode, EntranceNode, StatisticNode};
use crate::resource::ResourceWrapper;
use crate::slots::SlotChain;

/// State of one in-flight admission, owned by its context.
pub(crate) struct EntryFrame {
    pub(crate) seq: u64,
    pub(crate) resource: ResourceWrapper,
    pub(crate) count: u32,
    pub(crate) created_ms: u64,
    pub(crate) cur_node: Option<Arc<DefaultNode>>,
    pub(crate) origin_node: Option<Arc<StatisticNode>>,
    pub(crate) block_error: Option<BlockError>,
    pub(crate) queued_ms: Option<u64>,
    pub(crate) business_error: bool,
    pub(crate) chain: Arc<SlotChain>,
}

/// A named ambient record for one logical calling thread.
pub struct Context {
    id: u64,
    name: Arc<str>,
    origin: String,
    entrance: Arc<EntranceNode>,
    frames: Vec<EntryFrame>,
    next_seq: u64,
}

impl Context {
    pub(crate) fn new(id: u64, name: Arc<str>, origin: String, entrance: Arc<EntranceNode>) -> Self {
        Self {
            id,
            name,
            origin,
            entrance,
            frames: Vec::new(),
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the upstream caller, empty when anonymous.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn entrance_node(&self) -> &Arc<EntranceNode> {
        &self.entrance
    }

    /// Number of entries currently in flight.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The node selected for the entry currently being processed.
    #[must_use]
    pub fn cur_node(&self) -> Option<Arc<DefaultNode>> {
        self.frames.last().and_then(|f| f.cur_node.clone())
    }

    pub fn set_cur_node(&mut self, node: Arc<DefaultNode>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.cur_node = Some(node);
        }
    }

    /// The parent node for a new entry: the enclosing entry's node, or the
    /// entrance node at the top of the tree.
    #[must_use]
    pub fn last_node(&self) -> Arc<DefaultNode> {
        let parent = self
            .frames
            .len()
            .checked_sub(2)
            .and_then(|i| self.frames[i].cur_node.clone());
        parent.unwrap_or_else(|| self.entrance.as_default_node())
    }

    /// The caller-partitioned statistic node bound to the current entry.
    #[must_use]
    pub fn origin_node(&self) -> Option<Arc<StatisticNode>> {
        self.frames.last().and_then(|f| f.origin_node.clone())
    }

    pub fn set_origin_node(&mut self, node: Arc<StatisticNode>) {
        if let Some(frame) = self.frames.last_mut() {
            frame.origin_node = Some(node);
        }
    }

    /// The block attached to the current entry, if it was rejected.
    #[must_use]
    pub fn block_error(&self) -> Option<&BlockError> {
        self.frames.last().and_then(|f| f.block_error.as_ref())
    }

    #[must_use]
    pub fn cur_entry_created_ms(&self) -> Option<u64> {
        self.frames.last().map(|f| f.created_ms)
    }

    #[must_use]
    pub fn cur_entry_has_business_error(&self) -> bool {
        self.frames.last().is_some_and(|f| f.business_error)
    }

    pub(crate) fn set_block_error(&mut self, error: BlockError) {
        if let Some(frame) = self.frames.last_mut() {
            frame.block_error = Some(error);
        }
    }

    pub(crate) fn set_queued_ms(&mut self, queued_ms: u64) {
        if let Some(frame) = self.frames.last_mut() {
            frame.queued_ms = Some(queued_ms);
        }
    }

    pub(crate) fn cur_frame(&self) -> Option<&EntryFrame> {
        self.frames.last()
    }

    pub(crate) fn push_frame(
        &mut self,
        resource: ResourceWrapper,
        count: u32,
        created_ms: u64,
        chain: Arc<SlotChain>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.frames.push(EntryFrame {
            seq,
            resource,
            count,
            created_ms,
            cur_node: None,
            origin_node: None,
            block_error: None,
            queued_ms: None,
            business_error: false,
            chain,
        });
        seq
    }

    pub(crate) fn pop_frame(&mut self) -> Option<EntryFrame> {
        self.frames.pop()
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Attribute a business failure to the current entry. The statistic
    /// stage turns this into exception counts when the entry exits.
    pub fn trace_error(&mut self, entry: &Entry) {
        if entry.context_id() == self.id {
            if let Some(frame) = self.frames.last_mut() {
                if frame.seq == entry.seq() {
                    frame.business_error = true;
                }
            }
        }
    }

    /// Complete the current entry. Exits run in LIFO order; exiting anything
    /// but the current entry is a fatal mis-pair.
    pub fn exit(&mut self, entry: Entry) -> Result<(), EngineError> {
        let Some(top) = self.frames.last() else {
            return Err(EngineError::NoActiveEntry(self.name.to_string()));
        };
        if entry.context_id() != self.id || top.seq != entry.seq() {
            return Err(EngineError::MispairedExit {
                expected: top.resource.name().to_owned(),
                actual: entry.resource().name().to_owned(),
            });
        }
        let chain = Arc::clone(&top.chain);
        let resource = entry.resource().clone();
        chain.exit(self, &resource, entry.count());
        self.frames.pop();
        Ok(())
    }

    /// [`trace_error`](Self::trace_error) followed by [`exit`](Self::exit).
    pub fn exit_with_error(&mut self, entry: Entry) -> Result<(), EngineError> {
        self.trace_error(&entry);
        self.exit(entry)
    }
}
