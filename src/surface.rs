// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The windowing-collaborator boundary.
//!
//! Window creation and event handling live entirely outside this crate.  All a
//! [`Context`](crate::context::Context) needs is an opaque surface it can make
//! current, measure, and swap - the embedder implements [`NativeSurface`] over its
//! windowing stack, exposing raw handles where a native backend wants them.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// The three operations the core asks of a native drawing surface.
pub trait NativeSurface {
    /// Makes this surface's context current on the calling thread.
    fn make_current(&mut self);

    /// Client-area size in pixels.
    fn client_size(&self) -> (u32, u32);

    /// Presents the back buffer.
    fn swap_buffers(&mut self);

    /// Raw platform handles, where the surface has them.  Headless surfaces
    /// return `None`.
    fn raw_handles(&self) -> Option<(RawWindowHandle, RawDisplayHandle)> {
        None
    }
}

/// A surface with no window behind it, for tests and GPU-less environments.
#[derive(Debug, Clone, Copy)]
pub struct HeadlessSurface {
    size: (u32, u32),
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        HeadlessSurface {
            size: (width, height),
        }
    }
}

impl NativeSurface for HeadlessSurface {
    fn make_current(&mut self) {}

    fn client_size(&self) -> (u32, u32) {
        self.size
    }

    fn swap_buffers(&mut self) {}
}
