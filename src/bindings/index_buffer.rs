// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Index buffers, with range compression and subrange views.
//!
//! Indices are appended through [`IndexBufferBuilder`] as 32-bit values.  When the
//! builder is finished, the index range `{min, max}` is computed (excluding the
//! primitive-restart sentinel); if the span fits a 16-bit mapping with one value
//! reserved for the sentinel, the indices are rewritten in place as 16-bit values.
//! When the raw values themselves exceed 16 bits they are biased by `min` and the
//! bias is recorded as an *index base*, added back at draw time.
//!
//! A subrange view shares the parent's device storage and owns only offset/length
//! metadata; it never uploads or frees storage itself.
//!
//! # Example
//!
//! ```
//! use buffers_and_batches::bindings::index_buffer::{IndexBufferBuilder, IndexKind};
//! use buffers_and_batches::driver::trace::TraceDriver;
//! use buffers_and_batches::driver::Driver;
//! use std::sync::Arc;
//!
//! let driver: Arc<dyn Driver> = TraceDriver::new();
//! let mut builder = IndexBufferBuilder::new(3);
//! builder.extend(&[70000, 70005, 70001]);
//! let indices = builder.build(&driver);
//!
//! // span fits 16 bits, raw values don't: biased by the recorded base
//! assert_eq!(indices.kind(), IndexKind::U16);
//! assert_eq!(indices.base_index(), 70000);
//! assert_eq!(indices.indices(), vec![70000, 70005, 70001]);
//! ```

use std::sync::{Arc, Mutex};

use crate::bindings::UsageClass;
use crate::driver::{BufferId, BufferTarget, Driver};

/// Sentinel index that terminates one primitive strip/loop and starts the next
/// within a single draw call.  Excluded from range compression and preserved
/// (as `0xFFFF`) in 16-bit buffers.
pub const RESTART_INDEX: u32 = 0xFFFF_FFFF;

const RESTART_INDEX_U16: u16 = 0xFFFF;

/// Storage width of an index buffer after compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    U16,
    U32,
}

impl IndexKind {
    pub fn byte_size(self) -> usize {
        match self {
            IndexKind::U16 => 2,
            IndexKind::U32 => 4,
        }
    }
}

/// Accumulates indices before compression.
#[derive(Debug)]
pub struct IndexBufferBuilder {
    indices: Vec<u32>,
}

impl IndexBufferBuilder {
    pub fn new(index_capacity: usize) -> Self {
        IndexBufferBuilder {
            indices: Vec::with_capacity(index_capacity),
        }
    }

    /// Appends one index.
    ///
    /// # Panics
    ///
    /// Panics on the reserved sentinel value; use [`push_restart`](Self::push_restart).
    pub fn push(&mut self, index: u32) {
        assert!(index != RESTART_INDEX, "Reserved restart sentinel");
        self.indices.push(index);
    }

    /// Appends the primitive-restart sentinel.
    pub fn push_restart(&mut self) {
        self.indices.push(RESTART_INDEX);
    }

    pub fn extend(&mut self, indices: &[u32]) {
        for &index in indices {
            self.push(index);
        }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Compresses and finishes the buffer.  See the [module docs](self).
    pub fn build(self, driver: &Arc<dyn Driver>) -> IndexBuffer {
        let (min, max) = index_range(&self.indices);
        let span = max - min;
        let (kind, base_index, data) = if (span as u64) + 1 <= RESTART_INDEX_U16 as u64 {
            if max >= RESTART_INDEX_U16 as u32 {
                // raw values overflow 16 bits; bias by min and record the base
                let data = self
                    .indices
                    .iter()
                    .flat_map(|&i| {
                        let v = if i == RESTART_INDEX {
                            RESTART_INDEX_U16
                        } else {
                            (i - min) as u16
                        };
                        v.to_le_bytes()
                    })
                    .collect();
                (IndexKind::U16, min, data)
            } else {
                let data = self
                    .indices
                    .iter()
                    .flat_map(|&i| {
                        let v = if i == RESTART_INDEX {
                            RESTART_INDEX_U16
                        } else {
                            i as u16
                        };
                        v.to_le_bytes()
                    })
                    .collect();
                (IndexKind::U16, 0, data)
            }
        } else {
            let data = self.indices.iter().flat_map(|i| i.to_le_bytes()).collect();
            (IndexKind::U32, 0, data)
        };
        let len = self.indices.len();
        IndexBuffer {
            shared: Arc::new(IndexShared {
                kind,
                base_index,
                driver: driver.clone(),
                state: Mutex::new(SharedState {
                    data: Some(data),
                    device: None,
                }),
            }),
            start: 0,
            len,
        }
    }
}

/// `{min, max}` over the indices, excluding the restart sentinel.
fn index_range(indices: &[u32]) -> (u32, u32) {
    let mut bounds = None;
    for &index in indices {
        if index == RESTART_INDEX {
            continue;
        }
        bounds = Some(match bounds {
            None => (index, index),
            Some((min, max)) => (index.min(min), index.max(max)),
        });
    }
    bounds.unwrap_or((0, 0))
}

#[derive(Debug)]
struct SharedState {
    data: Option<Vec<u8>>,
    device: Option<BufferId>,
}

#[derive(Debug)]
struct IndexShared {
    kind: IndexKind,
    base_index: u32,
    driver: Arc<dyn Driver>,
    state: Mutex<SharedState>,
}

impl IndexShared {
    fn ensure_uploaded(&self) -> (BufferId, bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(device) = state.device {
            return (device, false);
        }
        let data = state
            .data
            .as_deref()
            .expect("index storage released without a device object");
        let id =
            self.driver
                .buffer_create(BufferTarget::Index, data.len(), Some(data), UsageClass::Static);
        state.device = Some(id);
        state.data = None;
        (id, true)
    }
}

impl Drop for IndexShared {
    fn drop(&mut self) {
        if let Some(device) = self.state.lock().unwrap().device.take() {
            self.driver.buffer_delete(device);
        }
    }
}

/// A finished index buffer, possibly a subrange view of another.
///
/// Cloning or [`subrange`](Self::subrange) shares the underlying storage; the device
/// object is freed once when the last view drops.
#[derive(Debug, Clone)]
pub struct IndexBuffer {
    shared: Arc<IndexShared>,
    start: usize,
    len: usize,
}

impl IndexBuffer {
    /// A view over `len` indices starting at `start` within this view.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds this view.
    pub fn subrange(&self, start: usize, len: usize) -> IndexBuffer {
        assert!(start + len <= self.len, "Subrange exceeds index buffer");
        IndexBuffer {
            shared: self.shared.clone(),
            start: self.start + start,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kind(&self) -> IndexKind {
        self.shared.kind
    }

    /// The compression bias, added back to every non-sentinel index at draw time.
    pub fn base_index(&self) -> u32 {
        self.shared.base_index
    }

    /// First index of this view, in elements from the start of the storage.
    pub fn index_start(&self) -> usize {
        self.start
    }

    /// Decompressed indices of this view, for inspection.
    ///
    /// # Panics
    ///
    /// Panics once host storage has been released to the device.
    pub fn indices(&self) -> Vec<u32> {
        let state = self.shared.state.lock().unwrap();
        let data = state
            .data
            .as_deref()
            .expect("Host storage released");
        match self.shared.kind {
            IndexKind::U16 => data
                .chunks_exact(2)
                .skip(self.start)
                .take(self.len)
                .map(|c| {
                    let v = u16::from_le_bytes([c[0], c[1]]);
                    if v == RESTART_INDEX_U16 {
                        RESTART_INDEX
                    } else {
                        v as u32 + self.shared.base_index
                    }
                })
                .collect(),
            IndexKind::U32 => data
                .chunks_exact(4)
                .skip(self.start)
                .take(self.len)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }

    /// Uploads the *shared* storage if needed; subranges never upload their own.
    /// The flag reports whether the device object was just created.
    pub(crate) fn ensure_uploaded(&self) -> (BufferId, bool) {
        self.shared.ensure_uploaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::trace::TraceDriver;

    #[test]
    fn small_indices_stay_verbatim_16_bit() {
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let mut builder = IndexBufferBuilder::new(3);
        builder.extend(&[0, 5, 2]);
        let indices = builder.build(&driver);
        assert_eq!(indices.kind(), IndexKind::U16);
        assert_eq!(indices.base_index(), 0);
        assert_eq!(indices.indices(), vec![0, 5, 2]);
    }

    #[test]
    fn wide_span_keeps_32_bit() {
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let mut builder = IndexBufferBuilder::new(3);
        builder.extend(&[0, 5, 65600]);
        let indices = builder.build(&driver);
        assert_eq!(indices.kind(), IndexKind::U32);
        assert_eq!(indices.indices(), vec![0, 5, 65600]);
    }

    #[test]
    fn restart_sentinel_survives_compression() {
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let mut builder = IndexBufferBuilder::new(5);
        builder.push(100_000);
        builder.push(100_001);
        builder.push_restart();
        builder.push(100_002);
        let indices = builder.build(&driver);
        assert_eq!(indices.kind(), IndexKind::U16);
        assert_eq!(indices.base_index(), 100_000);
        assert_eq!(
            indices.indices(),
            vec![100_000, 100_001, RESTART_INDEX, 100_002]
        );
    }

    #[test]
    fn subrange_shares_storage() {
        let trace = TraceDriver::new();
        let driver: Arc<dyn Driver> = trace.clone();
        let mut builder = IndexBufferBuilder::new(6);
        builder.extend(&[0, 1, 2, 3, 4, 5]);
        let indices = builder.build(&driver);
        let view = indices.subrange(2, 3);
        assert_eq!(view.indices(), vec![2, 3, 4]);
        let (a, _) = indices.ensure_uploaded();
        let (b, fresh) = view.ensure_uploaded();
        assert_eq!(a, b);
        assert!(!fresh);
        assert_eq!(trace.count_calls("buffer_create"), 1);
    }
}
