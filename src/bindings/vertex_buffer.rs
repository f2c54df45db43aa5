// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vertex buffers: host-staged, typed by a [`VertexFormat`], uploaded at first use.
//!
//! A vertex buffer owns a copy of the format it was allocated against.  Bytes are
//! staged host-side and reach the driver lazily: the first time a draw needs the
//! buffer, a device object is created sized to the *used* vertex count (not the
//! allocated count) and the staged bytes are transferred.  [`UsageClass::Static`]
//! buffers release their host storage at that point; dynamic and stream buffers
//! keep it for rewriting.
//!
//! # Example
//!
//! ```
//! use buffers_and_batches::bindings::vertex_buffer::VertexBuffer;
//! use buffers_and_batches::bindings::vertex_format::{VertexFormat, ComponentType, FetchMode};
//! use buffers_and_batches::bindings::UsageClass;
//! use buffers_and_batches::driver::trace::TraceDriver;
//! use buffers_and_batches::driver::Driver;
//! use std::sync::Arc;
//!
//! let driver: Arc<dyn Driver> = TraceDriver::new();
//! let mut format = VertexFormat::new();
//! format.add_attribute("pos", ComponentType::F32, 2, FetchMode::Float);
//!
//! let buffer = VertexBuffer::new(&driver, format, UsageClass::Static);
//! buffer.allocate(3);
//! buffer.fill_attribute_f32(0, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
//! assert_eq!(buffer.vertex_len(), 3);
//! ```

use std::sync::{Arc, Mutex};

use crate::bindings::vertex_format::{ComponentType, VertexFormat};
use crate::bindings::{BufferStatus, UsageClass};
use crate::driver::{BufferId, BufferTarget, Driver};

#[derive(Debug)]
struct State {
    data: Option<Vec<u8>>,
    vertex_alloc: usize,
    vertex_len: usize,
    status: BufferStatus,
    device: Option<BufferId>,
}

/// A typed vertex buffer.  See the [module docs](self).
#[derive(Debug)]
pub struct VertexBuffer {
    format: VertexFormat,
    usage: UsageClass,
    driver: Arc<dyn Driver>,
    state: Mutex<State>,
}

impl VertexBuffer {
    /// Creates an empty buffer against `format`.
    ///
    /// An unpacked format is packed here, against the driver's minimum vertex
    /// stride.  The buffer holds no storage until [`allocate`](Self::allocate).
    pub fn new(driver: &Arc<dyn Driver>, mut format: VertexFormat, usage: UsageClass) -> Arc<Self> {
        if !format.is_packed() {
            format.pack(driver.limits().minimum_vertex_stride as usize);
        }
        Arc::new(VertexBuffer {
            format,
            usage,
            driver: driver.clone(),
            state: Mutex::new(State {
                data: None,
                vertex_alloc: 0,
                vertex_len: 0,
                status: BufferStatus::Uninitialized,
                device: None,
            }),
        })
    }

    /// Sets the vertex count and acquires host storage if the usage requires it.
    pub fn allocate(&self, vertex_len: usize) {
        let mut state = self.state.lock().unwrap();
        assert!(
            state.status != BufferStatus::Discarded,
            "Buffer discarded"
        );
        if self.usage.wants_host_storage() {
            state.data = Some(vec![0; vertex_len * self.format.stride()]);
        }
        state.vertex_alloc = vertex_len;
        state.vertex_len = vertex_len;
        state.status = BufferStatus::Dirty;
    }

    /// Grows or shrinks the buffer, keeping existing bytes.  Does not upload.
    pub fn resize(&self, vertex_len: usize) {
        let mut state = self.state.lock().unwrap();
        assert!(
            state.status != BufferStatus::Discarded,
            "Buffer discarded"
        );
        if let Some(data) = state.data.as_mut() {
            data.resize(vertex_len * self.format.stride(), 0);
        }
        state.vertex_alloc = vertex_len;
        state.vertex_len = vertex_len;
        state.status = BufferStatus::Dirty;
    }

    /// Shrinks the *used* vertex count without touching storage.
    ///
    /// The next upload sizes the device object to this count.
    pub fn set_vertex_len(&self, used: usize) {
        let mut state = self.state.lock().unwrap();
        assert!(used <= state.vertex_alloc, "Used length exceeds allocation");
        if used != state.vertex_len {
            state.vertex_len = used;
            if state.status == BufferStatus::Uploaded {
                state.status = BufferStatus::Dirty;
            }
        }
    }

    /// Scatters raw attribute values into the staged bytes.
    ///
    /// `data` holds one tightly-packed value per used vertex
    /// (`attribute.byte_size() * vertex_len` bytes total).
    ///
    /// # Panics
    ///
    /// Panics if the buffer was never allocated, if host storage was already
    /// released (static usage after upload), or on a length mismatch.
    pub fn fill_attribute(&self, attr: usize, data: &[u8]) {
        let attribute = self.format.attribute(attr);
        let chunk = attribute.byte_size();
        let offset = attribute.offset();
        let stride = self.format.stride();
        let mut state = self.state.lock().unwrap();
        assert!(
            state.status != BufferStatus::Uninitialized,
            "Buffer never allocated"
        );
        let vertex_len = state.vertex_len;
        assert_eq!(data.len(), chunk * vertex_len, "Attribute data length mismatch");
        let host = state
            .data
            .as_mut()
            .expect("Host storage released; static buffers cannot be refilled");
        for v in 0..vertex_len {
            let dst = v * stride + offset;
            host[dst..dst + chunk].copy_from_slice(&data[v * chunk..(v + 1) * chunk]);
        }
        state.status = BufferStatus::Dirty;
    }

    /// Fills a float attribute from `f32` values, converting to the attribute's
    /// component type (`F16` via half-precision).
    ///
    /// `data` holds `comp_len` values per used vertex.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`fill_attribute`](Self::fill_attribute),
    /// or if the attribute's components are not floating point.
    pub fn fill_attribute_f32(&self, attr: usize, data: &[f32]) {
        let attribute = self.format.attribute(attr);
        let comp_len = attribute.comp_len() as usize;
        let bytes = match attribute.comp_type() {
            ComponentType::F32 => data.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>(),
            ComponentType::F16 => data
                .iter()
                .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
                .collect::<Vec<u8>>(),
            other => panic!("Float fill into {other:?} components"),
        };
        assert_eq!(
            data.len() % comp_len,
            0,
            "Attribute data length mismatch"
        );
        self.fill_attribute(attr, &bytes);
    }

    /// The used vertex count.
    pub fn vertex_len(&self) -> usize {
        self.state.lock().unwrap().vertex_len
    }

    pub fn format(&self) -> &VertexFormat {
        &self.format
    }

    pub fn usage(&self) -> UsageClass {
        self.usage
    }

    /// Releases all storage.  Terminal; further use is a programming error.
    pub fn discard(&self) {
        let mut state = self.state.lock().unwrap();
        state.data = None;
        if let Some(device) = state.device.take() {
            self.driver.buffer_delete(device);
        }
        state.status = BufferStatus::Discarded;
    }

    /// The use-path: uploads if dirty, returns the device object and whether it
    /// was (re)created (a cached attribute binding would point at the old one).
    ///
    /// The device object is (re)created sized to the used length.  Static usage
    /// releases host storage here.
    pub(crate) fn ensure_uploaded(&self) -> (BufferId, bool) {
        let mut state = self.state.lock().unwrap();
        match state.status {
            BufferStatus::Discarded => panic!("Buffer discarded"),
            BufferStatus::Uninitialized => panic!("Buffer never allocated"),
            BufferStatus::Uploaded => (
                state.device.expect("uploaded buffer has device id"),
                false,
            ),
            BufferStatus::Dirty => {
                let used_bytes = state.vertex_len * self.format.stride();
                if let Some(old) = state.device.take() {
                    self.driver.buffer_delete(old);
                }
                let host = state.data.as_deref().map(|d| &d[..used_bytes]);
                let id = self
                    .driver
                    .buffer_create(BufferTarget::Vertex, used_bytes, host, self.usage);
                state.device = Some(id);
                state.status = BufferStatus::Uploaded;
                if self.usage.frees_host_after_upload() {
                    state.data = None;
                }
                (id, true)
            }
        }
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        // buffer ids are driver-global; immediate deletion is safe from any thread
        if let Some(device) = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .device
            .take()
        {
            self.driver.buffer_delete(device);
        }
    }
}
