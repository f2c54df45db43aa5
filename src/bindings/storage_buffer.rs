// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Storage buffers: like uniform buffers, plus clears, read-back, and use as the
//! argument buffer for indirect draws.

use std::sync::{Arc, Mutex};

use crate::bindings::UsageClass;
use crate::bindings::uniform_buffer::SlotOutOfRange;
use crate::driver::{BufferId, BufferTarget, Driver};

#[derive(Debug)]
struct State {
    pending: Option<Vec<u8>>,
    device: Option<BufferId>,
}

/// A shader storage buffer.
///
/// Shares the uniform buffer's deferred-update behavior: writes before the first
/// [`bind`](StorageBuffer::bind) stage host-side and flush exactly once.
#[derive(Debug)]
pub struct StorageBuffer {
    byte_len: usize,
    usage: UsageClass,
    driver: Arc<dyn Driver>,
    state: Mutex<State>,
}

impl StorageBuffer {
    pub fn new(driver: &Arc<dyn Driver>, byte_len: usize, usage: UsageClass) -> Self {
        StorageBuffer {
            byte_len,
            usage,
            driver: driver.clone(),
            state: Mutex::new(State {
                pending: if usage.wants_host_storage() {
                    Some(vec![0; byte_len])
                } else {
                    None
                },
                device: None,
            }),
        }
    }

    /// Writes bytes at `offset`; staged before the first bind, immediate after.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the buffer, or on a device-only buffer.
    pub fn update(&self, offset: usize, bytes: &[u8]) {
        assert!(
            offset + bytes.len() <= self.byte_len,
            "Update range exceeds buffer length"
        );
        assert!(
            self.usage.wants_host_storage(),
            "Device-only buffers cannot be written from the host"
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

    /// Binds to a storage slot, creating and flushing the device object on the
    /// first call.
    pub fn bind(&self, slot: u32) -> Result<(), SlotOutOfRange> {
        let max = self.driver.limits().max_storage_buffer_slots;
        if slot >= max {
            return Err(SlotOutOfRange { slot, max });
        }
        let device = self.ensure_device();
        self.driver
            .buffer_bind_range(BufferTarget::Storage, slot, device, 0, self.byte_len);
        Ok(())
    }

    /// Zeroes the buffer, device-side once resident.
    pub fn clear_to_zero(&self) {
        let mut state = self.state.lock().unwrap();
        let device = state.device;
        match (state.pending.as_mut(), device) {
            (Some(pending), _) => pending.fill(0),
            (None, Some(device)) => self.driver.buffer_clear(device),
            (None, None) => {} // device-only, never created: nothing to clear yet
        }
    }

    /// Copies buffer contents back to the host.
    pub fn read_back(&self, offset: usize, out: &mut [u8]) {
        assert!(
            offset + out.len() <= self.byte_len,
            "Read range exceeds buffer length"
        );
        let state = self.state.lock().unwrap();
        match (&state.pending, state.device) {
            (Some(pending), _) => out.copy_from_slice(&pending[offset..offset + out.len()]),
            (None, Some(device)) => self.driver.buffer_read(device, offset, out),
            (None, None) => out.fill(0),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Creates (and flushes) the device object without binding it, for use as an
    /// indirect-draw argument buffer.
    pub(crate) fn ensure_device(&self) -> BufferId {
        let mut state = self.state.lock().unwrap();
        match state.device {
            Some(device) => device,
            None => {
                let pending = state.pending.take();
                let id = self.driver.buffer_create(
                    BufferTarget::Storage,
                    self.byte_len,
                    pending.as_deref(),
                    self.usage,
                );
                state.device = Some(id);
                id
            }
        }
    }
}

impl Drop for StorageBuffer {
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
    fn read_back_round_trips_through_the_device() {
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let buffer = StorageBuffer::new(&driver, 4, UsageClass::Dynamic);
        buffer.update(0, &[9, 8, 7, 6]);
        buffer.bind(0).expect("bind");
        let mut out = [0u8; 4];
        buffer.read_back(0, &mut out);
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn clear_reaches_the_device_once_resident() {
        let trace = TraceDriver::new();
        let driver: Arc<dyn Driver> = trace.clone();
        let buffer = StorageBuffer::new(&driver, 4, UsageClass::Dynamic);
        buffer.bind(0).expect("bind");
        buffer.clear_to_zero();
        assert_eq!(trace.count_calls("buffer_clear"), 1);
    }
}
