// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Attribute-binding object cache, keyed by shader interface identity.
//!
//! Two shader instances presenting an identical attribute layout share one cached
//! binding object.  Entries remember the context that built them: a lookup under a
//! different context invalidates the entry (queueing the stale id on the owner's
//! orphan list) instead of reusing a handle the driver scopes to its creator.

use std::sync::Arc;

use crate::context::ContextShared;
use crate::driver::VertexArrayId;

#[derive(Debug)]
struct Entry {
    interface_identity: u64,
    vao: VertexArrayId,
    owner: Arc<ContextShared>,
}

#[derive(Debug, Default)]
pub(crate) struct VaoCache {
    entries: Vec<Entry>,
}

impl VaoCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Finds a usable binding object for `identity` under `active`.
    ///
    /// A hit built under a different context is stale: it is released to its owner
    /// and `None` comes back so the caller rebuilds.
    pub(crate) fn lookup(
        &mut self,
        identity: u64,
        active: &Arc<ContextShared>,
    ) -> Option<VertexArrayId> {
        let position = self
            .entries
            .iter()
            .position(|e| e.interface_identity == identity)?;
        if Arc::ptr_eq(&self.entries[position].owner, active) {
            return Some(self.entries[position].vao);
        }
        let stale = self.entries.swap_remove(position);
        logwise::warn_sync!("Rebuilding attribute binding built under another context");
        stale.owner.release_vertex_array(stale.vao);
        None
    }

    pub(crate) fn insert(
        &mut self,
        identity: u64,
        vao: VertexArrayId,
        owner: Arc<ContextShared>,
    ) {
        self.entries.push(Entry {
            interface_identity: identity,
            vao,
            owner,
        });
    }

    /// Releases every entry; used when the batch's buffer set changes.
    pub(crate) fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            entry.owner.release_vertex_array(entry.vao);
        }
    }
}

impl Drop for VaoCache {
    fn drop(&mut self) {
        self.clear();
    }
}
