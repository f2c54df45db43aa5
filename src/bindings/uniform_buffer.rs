// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Uniform buffers with deferred first-bind flush.
//!
//! Writes made before the first [`bind`](UniformBuffer::bind) are buffered in host
//! memory and flushed exactly once when the device object is created at that first
//! bind.  Later writes go straight through to the driver.

use std::sync::{Arc, Mutex};

use crate::bindings::UsageClass;
use crate::driver::{BufferId, BufferTarget, Driver};

/// Binding a buffer to a slot the driver does not have.
#[derive(Debug, thiserror::Error)]
#[error("Binding slot {slot} exceeds driver limit {max}")]
pub struct SlotOutOfRange {
    pub slot: u32,
    pub max: u32,
}

#[derive(Debug)]
struct State {
    pending: Option<Vec<u8>>,
    device: Option<BufferId>,
}

/// A uniform buffer.  See the [module docs](self).
#[derive(Debug)]
pub struct UniformBuffer {
    byte_len: usize,
    driver: Arc<dyn Driver>,
    state: Mutex<State>,
}

impl UniformBuffer {
    pub fn new(driver: &Arc<dyn Driver>, byte_len: usize) -> Self {
        UniformBuffer {
            byte_len,
            driver: driver.clone(),
            state: Mutex::new(State {
                pending: Some(vec![0; byte_len]),
                device: None,
            }),
        }
    }

    /// Writes bytes at `offset`.
    ///
    /// Before the first bind this stages host-side; afterwards it reaches the driver
    /// immediately.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the buffer.
    pub fn update(&self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.byte_len,
            "Update range exceeds buffer length"
        );
        let mut state = self.state.lock().unwrap();
        let device = state.device;
        match (state.pending.as_mut(), device) {
            (Some(pending), _) => {
                pending[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
            (None, Some(device)) => {
                self.driver.buffer_update(device, offset, bytes);
            }
            (None, None) => unreachable!("no staging and no device object"),
        }
    }

    /// Binds to a uniform slot, creating and flushing the device object on the
    /// first call.
    pub fn bind(&self, slot: u32) -> Result<(), SlotOutOfRange> {
        let max = self.driver.limits().max_uniform_buffer_slots;
        if slot >= max {
            return Err(SlotOutOfRange { slot, max });
        }
        let mut state = self.state.lock().unwrap();
        let device = match state.device {
            Some(device) => device,
            None => {
                let pending = state.pending.take().expect("pending writes before first bind");
                let id = self.driver.buffer_create(
                    BufferTarget::Uniform,
                    self.byte_len,
                    Some(&pending),
                    UsageClass::Dynamic,
                );
                state.device = Some(id);
                id
            }
        };
        self.driver
            .buffer_bind_range(BufferTarget::Uniform, slot, device, 0, self.byte_len);
        Ok(())
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }
}

impl Drop for UniformBuffer {
    fn drop(&mut self) {
        if let Some(device) = self.state.lock().unwrap().device.take() {
            self.driver.buffer_delete(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::trace::TraceDriver;

    #[test]
    fn writes_before_first_bind_flush_once() {
        let trace = TraceDriver::new();
        let driver: Arc<dyn Driver> = trace.clone();
        let buffer = UniformBuffer::new(&driver, 16);
        buffer.update(0, &[1; 8]);
        buffer.update(8, &[2; 8]);
        assert_eq!(trace.count_calls("buffer_update"), 0);
        buffer.bind(0).expect("bind");
        assert_eq!(trace.count_calls("buffer_create"), 1);
        assert_eq!(trace.count_calls("buffer_update"), 0);
        buffer.bind(1).expect("bind");
        assert_eq!(trace.count_calls("buffer_create"), 1);
    }

    #[test]
    fn slot_above_limit_is_reported() {
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let buffer = UniformBuffer::new(&driver, 16);
        let max = driver.limits().max_uniform_buffer_slots;
        let err = buffer.bind(max).expect_err("out of range");
        assert_eq!(err.slot, max);
    }
}
