// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-thread active contexts.

A [`Context`] owns what the driver scopes to one native rendering context: the
global [`StateManager`], the default framebuffers, the immediate-mode scratch ring,
the shared zero-filled attribute fallback buffer, and two orphan lists.

Each context is usable by exactly one thread at a time.  [`Context::activate`]
makes a surface current, publishes the process-wide-per-thread active pointer, and
drains the orphan lists.  Context-private ids (attribute bindings, framebuffers)
released from some other thread are queued on those lists instead of being deleted
through the driver directly - freeing is a driver call that must run on the owning
context, so this stays a producer/consumer queue rather than an atomics trick.
*/

pub mod framebuffer;
pub mod immediate;

use std::cell::RefCell;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::bindings::UsageClass;
use crate::driver::{BufferId, BufferTarget, Driver, FramebufferId, VertexArrayId};
use crate::pipeline::state::StateManager;
use crate::surface::NativeSurface;

thread_local! {
    static ACTIVE: RefCell<Option<Arc<Context>>> = const { RefCell::new(None) };
}

// 16 vec4s of zeroes; enough for any fallback attribute fetch
const ZERO_FALLBACK_BYTES: usize = 256;

/// The part of a context that outlives thread affinity: the driver handle and the
/// orphan lists other threads enqueue on.
#[derive(Debug)]
pub(crate) struct ContextShared {
    driver: Arc<dyn Driver>,
    orphaned_vertex_arrays: Mutex<Vec<VertexArrayId>>,
    orphaned_framebuffers: Mutex<Vec<FramebufferId>>,
    active_thread: Mutex<Option<ThreadId>>,
}

impl ContextShared {
    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    fn is_active_on_this_thread(&self) -> bool {
        *self.active_thread.lock().unwrap() == Some(thread::current().id())
    }

    /// Deletes immediately when this context is current on the calling thread,
    /// else queues for the owner's next activation.
    pub(crate) fn release_vertex_array(&self, vao: VertexArrayId) {
        if self.is_active_on_this_thread() {
            self.driver.vertex_array_delete(vao);
        } else {
            self.orphaned_vertex_arrays.lock().unwrap().push(vao);
        }
    }

    /// Framebuffer flavor of [`release_vertex_array`](Self::release_vertex_array).
    pub(crate) fn release_framebuffer(&self, framebuffer: FramebufferId) {
        if self.is_active_on_this_thread() {
            self.driver.framebuffer_delete(framebuffer);
        } else {
            self.orphaned_framebuffers.lock().unwrap().push(framebuffer);
        }
    }
}

/// A native rendering context.  See the [module docs](self).
///
/// # Example
///
/// ```
/// use buffers_and_batches::context::Context;
/// use buffers_and_batches::driver::trace::TraceDriver;
/// use buffers_and_batches::driver::Driver;
/// use buffers_and_batches::surface::HeadlessSurface;
/// use std::sync::Arc;
///
/// let driver: Arc<dyn Driver> = TraceDriver::new();
/// let context = Context::new(driver);
/// let mut surface = HeadlessSurface::new(1280, 720);
/// context.activate(&mut surface);
/// assert_eq!(context.surface_size(), (1280, 720));
/// context.deactivate();
/// ```
#[derive(Debug)]
pub struct Context {
    pub(crate) shared: Arc<ContextShared>,
    state: Mutex<StateManager>,
    immediate: Mutex<immediate::ImmediateScratch>,
    zero_buffer: BufferId,
    default_framebuffers: [FramebufferId; 2],
    surface_size: Mutex<(u32, u32)>,
    weak_self: std::sync::Weak<Context>,
}

impl Context {
    pub fn new(driver: Arc<dyn Driver>) -> Arc<Context> {
        let zeros = [0u8; ZERO_FALLBACK_BYTES];
        let zero_buffer = driver.buffer_create(
            BufferTarget::Vertex,
            ZERO_FALLBACK_BYTES,
            Some(&zeros),
            UsageClass::Static,
        );
        let default_framebuffers = [driver.framebuffer_create(), driver.framebuffer_create()];
        let state = StateManager::new(driver.limits());
        Arc::new_cyclic(|weak_self| Context {
            shared: Arc::new(ContextShared {
                driver,
                orphaned_vertex_arrays: Mutex::new(Vec::new()),
                orphaned_framebuffers: Mutex::new(Vec::new()),
                active_thread: Mutex::new(None),
            }),
            state: Mutex::new(state),
            immediate: Mutex::new(immediate::ImmediateScratch::new()),
            zero_buffer,
            default_framebuffers,
            surface_size: Mutex::new((0, 0)),
            weak_self: weak_self.clone(),
        })
    }

    /// Makes `surface` current on the calling thread, drains the orphan lists, and
    /// publishes this context as the thread's active context.
    ///
    /// # Panics
    ///
    /// Panics if the context is currently active on a *different* thread.
    pub fn activate(&self, surface: &mut dyn NativeSurface) {
        {
            let mut active_thread = self.shared.active_thread.lock().unwrap();
            let current = thread::current().id();
            assert!(
                active_thread.is_none() || *active_thread == Some(current),
                "Context is active on another thread"
            );
            *active_thread = Some(current);
        }
        // displace whatever this thread had current
        ACTIVE.with(|slot| {
            if let Some(previous) = slot.borrow_mut().take() {
                if !std::ptr::eq(Arc::as_ptr(&previous), self) {
                    *previous.shared.active_thread.lock().unwrap() = None;
                }
            }
        });
        surface.make_current();
        *self.surface_size.lock().unwrap() = surface.client_size();
        self.drain_orphans();
        let strong = self.weak_self.upgrade().expect("context is alive");
        ACTIVE.with(|slot| *slot.borrow_mut() = Some(strong));
    }

    /// Clears the thread's active pointer if it is this context.
    pub fn deactivate(&self) {
        ACTIVE.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot
                .as_ref()
                .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), self))
            {
                *slot = None;
            }
        });
        *self.shared.active_thread.lock().unwrap() = None;
    }

    /// The calling thread's active context, if any.
    pub fn active() -> Option<Arc<Context>> {
        ACTIVE.with(|slot| slot.borrow().clone())
    }

    fn drain_orphans(&self) {
        let vaos = std::mem::take(&mut *self.shared.orphaned_vertex_arrays.lock().unwrap());
        let framebuffers =
            std::mem::take(&mut *self.shared.orphaned_framebuffers.lock().unwrap());
        if !vaos.is_empty() || !framebuffers.is_empty() {
            logwise::info_sync!(
                "Draining {count} orphaned driver objects",
                count = logwise::privacy::LogIt(vaos.len() + framebuffers.len())
            );
        }
        for vao in vaos {
            self.shared.driver.vertex_array_delete(vao);
        }
        for framebuffer in framebuffers {
            self.shared.driver.framebuffer_delete(framebuffer);
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.shared.driver()
    }

    /// The global pipeline state, behind its lock.
    pub fn state(&self) -> MutexGuard<'_, StateManager> {
        self.state.lock().unwrap()
    }

    /// Client-area size recorded at the last activation.
    pub fn surface_size(&self) -> (u32, u32) {
        *self.surface_size.lock().unwrap()
    }

    /// Binds the window-system-provided framebuffer.
    pub fn bind_default_framebuffer(&self) {
        self.shared
            .driver
            .framebuffer_bind(self.default_framebuffers[0]);
    }

    /// The shared constant zero-filled buffer backing unmatched attributes.
    pub(crate) fn zero_buffer(&self) -> BufferId {
        self.zero_buffer
    }

    pub(crate) fn immediate_scratch(&self) -> MutexGuard<'_, immediate::ImmediateScratch> {
        self.immediate.lock().unwrap()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shared.driver.buffer_delete(self.zero_buffer);
        if let Some(buffer) = self.immediate.lock().unwrap().take_buffer() {
            self.shared.driver.buffer_delete(buffer);
        }
        for framebuffer in self.default_framebuffers {
            self.shared.driver.framebuffer_delete(framebuffer);
        }
    }
}
