// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Draw batches: buffers + shader, with a cached attribute binding.
//!
//! A [`Batch`] bundles up to 16 vertex buffers, up to 2 instance buffers, at most
//! one index buffer, a primitive topology, and a shader.  Buffers are held as `Arc`
//! handles; the last handle to drop frees the underlying storage.
//!
//! The attribute-binding object a draw needs is derived, not owned: it is resolved
//! through a per-batch cache keyed by shader *interface identity* (see
//! [`ShaderInterface::identity`](crate::pipeline::shader::ShaderInterface::identity))
//! and rebuilt when the buffer set changes or when the batch is drawn under a
//! different context than the one that built the cached object.
//!
//! Binding walks vertex buffers in reverse registration order and binds only the
//! attributes the shader interface declares, so a name present in several buffers
//! resolves to the first-registered one.  Interface attributes no buffer supplies
//! read from a shared zero-filled fallback buffer, never driver-undefined memory.

use std::sync::Arc;

use crate::bindings::index_buffer::IndexBuffer;
use crate::bindings::storage_buffer::StorageBuffer;
use crate::bindings::vertex_buffer::VertexBuffer;
use crate::bindings::vertex_format::{ComponentType, FetchMode};
use crate::context::Context;
use crate::driver::{AttributePointer, Driver, VertexArrayId};
use crate::pipeline::Primitive;
use crate::pipeline::shader::{Shader, ShaderInterface};
use crate::pipeline::vao_cache::VaoCache;

/// Vertex-buffer slots per batch.
pub const MAX_BATCH_VERTEX_BUFFERS: usize = 16;

/// Instance-buffer slots per batch.
pub const MAX_BATCH_INSTANCE_BUFFERS: usize = 2;

#[derive(Debug, Clone, Copy)]
enum DrawParams {
    Direct {
        count: u32,
    },
    Indexed {
        first: u32,
        count: u32,
        base: i32,
        kind: crate::bindings::index_buffer::IndexKind,
    },
}

impl DrawParams {
    fn count(&self) -> u32 {
        match self {
            DrawParams::Direct { count } => *count,
            DrawParams::Indexed { count, .. } => *count,
        }
    }
}

/// A bundle of buffers and a shader, ready to be drawn.  See the
/// [module docs](self).
#[derive(Debug)]
pub struct Batch {
    primitive: Primitive,
    verts: [Option<Arc<VertexBuffer>>; MAX_BATCH_VERTEX_BUFFERS],
    inst: [Option<Arc<VertexBuffer>>; MAX_BATCH_INSTANCE_BUFFERS],
    elem: Option<IndexBuffer>,
    shader: Option<Arc<Shader>>,
    cache: VaoCache,
    buffers_dirty: bool,
}

impl Batch {
    pub fn new(primitive: Primitive) -> Self {
        Batch {
            primitive,
            verts: std::array::from_fn(|_| None),
            inst: std::array::from_fn(|_| None),
            elem: None,
            shader: None,
            cache: VaoCache::new(),
            buffers_dirty: false,
        }
    }

    pub fn primitive(&self) -> Primitive {
        self.primitive
    }

    /// Registers a vertex buffer in the next free slot and returns the slot.
    ///
    /// Earlier slots take priority when several buffers declare the same attribute
    /// name.
    ///
    /// # Panics
    ///
    /// Panics when all [`MAX_BATCH_VERTEX_BUFFERS`] slots are taken.
    pub fn add_vertex_buffer(&mut self, buffer: Arc<VertexBuffer>) -> usize {
        let slot = self
            .verts
            .iter()
            .position(|s| s.is_none())
            .expect("Too many vertex buffers");
        self.verts[slot] = Some(buffer);
        self.buffers_dirty = true;
        slot
    }

    /// Sets an instance buffer slot.  Instance attributes step per instance.
    ///
    /// # Panics
    ///
    /// Panics on a slot at or above [`MAX_BATCH_INSTANCE_BUFFERS`].
    pub fn set_instance_buffer(&mut self, slot: usize, buffer: Arc<VertexBuffer>) {
        assert!(slot < MAX_BATCH_INSTANCE_BUFFERS, "Instance slot out of range");
        self.inst[slot] = Some(buffer);
        self.buffers_dirty = true;
    }

    pub fn set_index_buffer(&mut self, indices: IndexBuffer) {
        self.elem = Some(indices);
        self.buffers_dirty = true;
    }

    pub fn set_shader(&mut self, shader: Arc<Shader>) {
        self.shader = Some(shader);
    }

    pub fn shader(&self) -> Option<&Arc<Shader>> {
        self.shader.as_ref()
    }

    /// Marks the buffer set changed, invalidating cached attribute bindings.
    ///
    /// The mutating setters do this themselves; call it after writing through a
    /// buffer handle the batch shares.
    pub fn tag_buffers_changed(&mut self) {
        self.buffers_dirty = true;
    }

    /// Sets a push constant on the attached shader by name.
    ///
    /// # Panics
    ///
    /// Panics if no shader is attached.
    pub fn set_uniform_f32(&self, name: &str, values: &[f32]) {
        self.shader
            .as_ref()
            .expect("No shader attached")
            .set_uniform_f32(name, values);
    }

    /// Non-instanced draw.
    ///
    /// # Panics
    ///
    /// Panics if instance-buffer slot 0 is populated (use
    /// [`draw_instanced`](Self::draw_instanced)) or no shader is attached.
    /// A zero vertex count skips the draw silently.
    pub fn draw(&mut self, ctx: &Context) {
        assert!(
            self.inst[0].is_none(),
            "Instance buffer bound; use draw_instanced"
        );
        self.dispatch(ctx, 1);
    }

    /// Instanced draw.  The instance count is the minimum vertex length across
    /// populated instance-buffer slots, defaulting to 1 if none; zero skips the
    /// draw silently.
    pub fn draw_instanced(&mut self, ctx: &Context) {
        let instances = self.instance_count();
        self.dispatch(ctx, instances);
    }

    /// Draw with GPU-resident arguments.
    pub fn draw_indirect(&mut self, ctx: &Context, args: &StorageBuffer, offset: usize) {
        let shader = self.shader.clone().expect("No shader attached");
        let driver = ctx.driver().clone();
        ctx.state().apply(&*driver);
        let vao = self.resolve_binding(ctx, &shader);
        driver.program_bind(shader.program());
        driver.vertex_array_bind(vao);
        driver.draw_indirect(self.primitive, args.ensure_device(), offset);
    }

    fn instance_count(&self) -> u32 {
        self.inst
            .iter()
            .flatten()
            .map(|buffer| buffer.vertex_len() as u32)
            .min()
            .unwrap_or(1)
    }

    fn dispatch(&mut self, ctx: &Context, instance_count: u32) {
        let shader = self.shader.clone().expect("No shader attached");
        let params = self.derive_params();
        if params.count() == 0 || instance_count == 0 {
            return;
        }
        let driver = ctx.driver().clone();
        ctx.state().apply(&*driver);
        let vao = self.resolve_binding(ctx, &shader);
        driver.program_bind(shader.program());
        driver.vertex_array_bind(vao);
        match params {
            DrawParams::Direct { count } => {
                driver.draw(self.primitive, 0, count, instance_count);
            }
            DrawParams::Indexed {
                first,
                count,
                base,
                kind,
            } => {
                driver.draw_indexed(self.primitive, kind, first, count, base, instance_count);
            }
        }
    }

    /// Vertex count, first index, and base index come from the index buffer when
    /// present (honoring subrange and compression bias), else from the first
    /// vertex buffer's length.
    fn derive_params(&self) -> DrawParams {
        match &self.elem {
            Some(elem) => DrawParams::Indexed {
                first: elem.index_start() as u32,
                count: elem.len() as u32,
                base: elem.base_index() as i32,
                kind: elem.kind(),
            },
            None => {
                let first_buffer = self
                    .verts
                    .iter()
                    .flatten()
                    .next()
                    .expect("Batch has no vertex buffers");
                DrawParams::Direct {
                    count: first_buffer.vertex_len() as u32,
                }
            }
        }
    }

    fn resolve_binding(&mut self, ctx: &Context, shader: &Shader) -> VertexArrayId {
        // upload first: a dirty buffer recreates its device object, which any
        // cached binding would still point at
        let mut recreated = false;
        for buffer in self.inst.iter().flatten().chain(self.verts.iter().flatten()) {
            recreated |= buffer.ensure_uploaded().1;
        }
        if let Some(elem) = &self.elem {
            recreated |= elem.ensure_uploaded().1;
        }
        if self.buffers_dirty || recreated {
            self.cache.clear();
            self.buffers_dirty = false;
        }
        let identity = shader.interface().identity();
        if let Some(vao) = self.cache.lookup(identity, &ctx.shared) {
            return vao;
        }
        let vao = self.build_binding(ctx, shader.interface());
        self.cache.insert(identity, vao, ctx.shared.clone());
        vao
    }

    fn build_binding(&self, ctx: &Context, interface: &ShaderInterface) -> VertexArrayId {
        let driver = ctx.driver();
        let vao = driver.vertex_array_create();
        let mut matched: u32 = 0;
        // instance buffers then vertex buffers, each walked in reverse registration
        // order: the first-registered buffer's binds land last and win
        for slot in (0..MAX_BATCH_INSTANCE_BUFFERS).rev() {
            if let Some(buffer) = &self.inst[slot] {
                matched |= bind_buffer_attributes(&**driver, vao, buffer, interface, 1);
            }
        }
        for slot in (0..MAX_BATCH_VERTEX_BUFFERS).rev() {
            if let Some(buffer) = &self.verts[slot] {
                matched |= bind_buffer_attributes(&**driver, vao, buffer, interface, 0);
            }
        }
        for input in interface.attributes() {
            if matched & (1 << input.location) == 0 {
                driver.vertex_array_attribute(
                    vao,
                    input.location,
                    ctx.zero_buffer(),
                    AttributePointer {
                        offset: 0,
                        stride: 0,
                        comp_type: ComponentType::F32,
                        comp_len: 4,
                        fetch: FetchMode::Float,
                        divisor: 0,
                    },
                );
            }
        }
        if let Some(elem) = &self.elem {
            driver.vertex_array_index_buffer(vao, elem.ensure_uploaded().0);
        }
        vao
    }
}

fn bind_buffer_attributes(
    driver: &dyn Driver,
    vao: VertexArrayId,
    buffer: &VertexBuffer,
    interface: &ShaderInterface,
    divisor: u32,
) -> u32 {
    let (id, _) = buffer.ensure_uploaded();
    let format = buffer.format();
    let mut matched = 0;
    for attr in format.attributes() {
        for name in attr.names() {
            if let Some(input) = interface.attribute(name) {
                driver.vertex_array_attribute(
                    vao,
                    input.location,
                    id,
                    AttributePointer {
                        offset: attr.offset(),
                        stride: format.stride(),
                        comp_type: attr.comp_type(),
                        comp_len: attr.comp_len(),
                        fetch: attr.fetch(),
                        divisor,
                    },
                );
                matched |= 1 << input.location;
            }
        }
    }
    matched
}
