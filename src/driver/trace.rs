// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Headless trace driver.

Allocates ids, keeps buffer contents in host memory so read-backs work, and records
every entry point into a log.  This is what the test suite draws against; it is also
a reasonable stand-in on machines with no GPU at all.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    Attachment, AttributePointer, BufferId, BufferTarget, Driver, DriverLimits, FramebufferId,
    FramebufferStatus, ProgramId, StageSources, TextureId, VertexArrayId,
};
use crate::bindings::UsageClass;
use crate::bindings::index_buffer::IndexKind;
use crate::pipeline::Primitive;
use crate::pipeline::state::{
    Blend, Culling, DepthTest, ProvokingVertex, StencilOp, StencilTest, WriteMask,
};

/// One recorded driver entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceCall {
    /// The entry point name, e.g. `"set_blend"`.
    pub entry: &'static str,
    /// A human-readable summary of the arguments.
    pub detail: String,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u32,
    log: Vec<TraceCall>,
    buffers: HashMap<u32, Vec<u8>>,
    framebuffer_attachments: HashMap<u32, usize>,
    fail_next_compile: Option<String>,
}

impl Inner {
    fn alloc_id(&mut self) -> u32 {
        // id 0 is reserved for "nothing bound"
        self.next_id += 1;
        self.next_id
    }

    fn record(&mut self, entry: &'static str, detail: String) {
        self.log.push(TraceCall { entry, detail });
    }
}

/// A [`Driver`] that records instead of rendering.
#[derive(Debug)]
pub struct TraceDriver {
    limits: DriverLimits,
    inner: Mutex<Inner>,
}

impl TraceDriver {
    pub fn new() -> Arc<Self> {
        Self::with_limits(DriverLimits::default())
    }

    pub fn with_limits(limits: DriverLimits) -> Arc<Self> {
        Arc::new(TraceDriver {
            limits,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Drains and returns the call log.
    pub fn take_log(&self) -> Vec<TraceCall> {
        std::mem::take(&mut self.inner.lock().unwrap().log)
    }

    /// Number of calls recorded since the last [`take_log`](Self::take_log).
    pub fn log_len(&self) -> usize {
        self.inner.lock().unwrap().log.len()
    }

    /// Number of recorded calls to the given entry point since the last drain.
    pub fn count_calls(&self, entry: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|c| c.entry == entry)
            .count()
    }

    /// Arms the next [`Driver::program_create`] to fail with the given diagnostic.
    pub fn fail_next_compile(&self, diagnostic: &str) {
        self.inner.lock().unwrap().fail_next_compile = Some(diagnostic.to_string());
    }

    /// Bytes currently stored for a buffer id, for test inspection.
    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().buffers.get(&buffer.0).cloned()
    }

    fn record(&self, entry: &'static str, detail: String) {
        self.inner.lock().unwrap().record(entry, detail);
    }
}

impl Driver for TraceDriver {
    fn limits(&self) -> DriverLimits {
        self.limits
    }

    fn buffer_create(
        &self,
        target: BufferTarget,
        len: usize,
        data: Option<&[u8]>,
        usage: UsageClass,
    ) -> BufferId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.alloc_id();
        let contents = match data {
            Some(bytes) => {
                assert!(bytes.len() <= len, "Initial data exceeds buffer length");
                let mut v = bytes.to_vec();
                v.resize(len, 0);
                v
            }
            None => vec![0; len],
        };
        inner.buffers.insert(id, contents);
        inner.record(
            "buffer_create",
            format!(
                "id={id} target={target:?} len={len} usage={usage:?} init={}",
                data.is_some()
            ),
        );
        BufferId(id)
    }

    fn buffer_update(&self, buffer: BufferId, offset: usize, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let storage = inner
            .buffers
            .get_mut(&buffer.0)
            .expect("Update of unknown buffer");
        assert!(
            offset + data.len() <= storage.len(),
            "Update range exceeds buffer length"
        );
        storage[offset..offset + data.len()].copy_from_slice(data);
        inner.record(
            "buffer_update",
            format!("id={} offset={offset} len={}", buffer.0, data.len()),
        );
    }

    fn buffer_read(&self, buffer: BufferId, offset: usize, out: &mut [u8]) {
        let mut inner = self.inner.lock().unwrap();
        let storage = inner
            .buffers
            .get(&buffer.0)
            .expect("Read of unknown buffer");
        assert!(
            offset + out.len() <= storage.len(),
            "Read range exceeds buffer length"
        );
        out.copy_from_slice(&storage[offset..offset + out.len()]);
        inner.record(
            "buffer_read",
            format!("id={} offset={offset} len={}", buffer.0, out.len()),
        );
    }

    fn buffer_clear(&self, buffer: BufferId) {
        let mut inner = self.inner.lock().unwrap();
        let storage = inner
            .buffers
            .get_mut(&buffer.0)
            .expect("Clear of unknown buffer");
        storage.fill(0);
        inner.record("buffer_clear", format!("id={}", buffer.0));
    }

    fn buffer_delete(&self, buffer: BufferId) {
        let mut inner = self.inner.lock().unwrap();
        inner.buffers.remove(&buffer.0);
        inner.record("buffer_delete", format!("id={}", buffer.0));
    }

    fn buffer_bind_range(
        &self,
        target: BufferTarget,
        slot: u32,
        buffer: BufferId,
        offset: usize,
        len: usize,
    ) {
        self.record(
            "buffer_bind_range",
            format!(
                "target={target:?} slot={slot} id={} offset={offset} len={len}",
                buffer.0
            ),
        );
    }

    fn vertex_array_create(&self) -> VertexArrayId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.alloc_id();
        inner.record("vertex_array_create", format!("id={id}"));
        VertexArrayId(id)
    }

    fn vertex_array_attribute(
        &self,
        vao: VertexArrayId,
        location: u32,
        buffer: BufferId,
        pointer: AttributePointer,
    ) {
        self.record(
            "vertex_array_attribute",
            format!(
                "vao={} location={location} buffer={} offset={} stride={} type={:?}x{} fetch={:?} divisor={}",
                vao.0,
                buffer.0,
                pointer.offset,
                pointer.stride,
                pointer.comp_type,
                pointer.comp_len,
                pointer.fetch,
                pointer.divisor
            ),
        );
    }

    fn vertex_array_index_buffer(&self, vao: VertexArrayId, buffer: BufferId) {
        self.record(
            "vertex_array_index_buffer",
            format!("vao={} buffer={}", vao.0, buffer.0),
        );
    }

    fn vertex_array_bind(&self, vao: VertexArrayId) {
        self.record("vertex_array_bind", format!("id={}", vao.0));
    }

    fn vertex_array_delete(&self, vao: VertexArrayId) {
        self.record("vertex_array_delete", format!("id={}", vao.0));
    }

    fn program_create(&self, sources: &StageSources) -> Result<ProgramId, String> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(diagnostic) = inner.fail_next_compile.take() {
            inner.record("program_create", format!("failed: {diagnostic}"));
            return Err(diagnostic);
        }
        let id = inner.alloc_id();
        inner.record(
            "program_create",
            format!(
                "id={id} vertex={} fragment={} geometry={} compute={}",
                sources.vertex.is_some(),
                sources.fragment.is_some(),
                sources.geometry.is_some(),
                sources.compute.is_some()
            ),
        );
        Ok(ProgramId(id))
    }

    fn program_bind(&self, program: ProgramId) {
        self.record("program_bind", format!("id={}", program.0));
    }

    fn program_delete(&self, program: ProgramId) {
        self.record("program_delete", format!("id={}", program.0));
    }

    fn program_uniform_f32(&self, program: ProgramId, location: u32, values: &[f32]) {
        self.record(
            "program_uniform_f32",
            format!("id={} location={location} values={values:?}", program.0),
        );
    }

    fn program_uniform_i32(&self, program: ProgramId, location: u32, values: &[i32]) {
        self.record(
            "program_uniform_i32",
            format!("id={} location={location} values={values:?}", program.0),
        );
    }

    fn set_blend(&self, blend: Blend) {
        self.record("set_blend", format!("{blend:?}"));
    }

    fn set_write_mask(&self, mask: WriteMask) {
        self.record("set_write_mask", format!("{mask:?}"));
    }

    fn set_culling(&self, culling: Culling) {
        self.record("set_culling", format!("{culling:?}"));
    }

    fn set_depth_test(&self, test: DepthTest) {
        self.record("set_depth_test", format!("{test:?}"));
    }

    fn set_stencil(&self, test: StencilTest, op: StencilOp) {
        self.record("set_stencil", format!("{test:?} {op:?}"));
    }

    fn set_provoking_vertex(&self, provoking: ProvokingVertex) {
        self.record("set_provoking_vertex", format!("{provoking:?}"));
    }

    fn set_clip_distances(&self, count: u32) {
        self.record("set_clip_distances", format!("count={count}"));
    }

    fn set_line_width(&self, width: f32) {
        self.record("set_line_width", format!("width={width}"));
    }

    fn set_depth_range(&self, near: f32, far: f32) {
        self.record("set_depth_range", format!("near={near} far={far}"));
    }

    fn set_point_size(&self, size: f32) {
        self.record("set_point_size", format!("size={size}"));
    }

    fn set_stencil_values(&self, reference: u8, compare_mask: u8, write_mask: u8) {
        self.record(
            "set_stencil_values",
            format!("reference={reference} compare_mask={compare_mask} write_mask={write_mask}"),
        );
    }

    fn texture_bind_unit(&self, unit: u32, texture: TextureId) {
        self.record(
            "texture_bind_unit",
            format!("unit={unit} texture={}", texture.0),
        );
    }

    fn texture_bind_units(&self, first: u32, textures: &[TextureId]) {
        self.record(
            "texture_bind_units",
            format!(
                "first={first} count={} textures={:?}",
                textures.len(),
                textures.iter().map(|t| t.0).collect::<Vec<_>>()
            ),
        );
    }

    fn texture_delete(&self, texture: TextureId) {
        self.record("texture_delete", format!("id={}", texture.0));
    }

    fn framebuffer_create(&self) -> FramebufferId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.alloc_id();
        inner.framebuffer_attachments.insert(id, 0);
        inner.record("framebuffer_create", format!("id={id}"));
        FramebufferId(id)
    }

    fn framebuffer_attach(
        &self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: TextureId,
    ) {
        let mut inner = self.inner.lock().unwrap();
        *inner
            .framebuffer_attachments
            .entry(framebuffer.0)
            .or_insert(0) += 1;
        inner.record(
            "framebuffer_attach",
            format!(
                "id={} attachment={attachment:?} texture={}",
                framebuffer.0, texture.0
            ),
        );
    }

    fn framebuffer_check(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let mut inner = self.inner.lock().unwrap();
        let status = match inner.framebuffer_attachments.get(&framebuffer.0) {
            Some(0) | None => FramebufferStatus::MissingAttachment,
            Some(_) => FramebufferStatus::Complete,
        };
        inner.record("framebuffer_check", format!("id={}", framebuffer.0));
        status
    }

    fn framebuffer_bind(&self, framebuffer: FramebufferId) {
        self.record("framebuffer_bind", format!("id={}", framebuffer.0));
    }

    fn framebuffer_delete(&self, framebuffer: FramebufferId) {
        let mut inner = self.inner.lock().unwrap();
        inner.framebuffer_attachments.remove(&framebuffer.0);
        inner.record("framebuffer_delete", format!("id={}", framebuffer.0));
    }

    fn draw(&self, primitive: Primitive, first: u32, count: u32, instance_count: u32) {
        self.record(
            "draw",
            format!("primitive={primitive:?} first={first} count={count} instances={instance_count}"),
        );
    }

    fn draw_indexed(
        &self,
        primitive: Primitive,
        kind: IndexKind,
        first: u32,
        count: u32,
        base_index: i32,
        instance_count: u32,
    ) {
        self.record(
            "draw_indexed",
            format!(
                "primitive={primitive:?} kind={kind:?} first={first} count={count} base={base_index} instances={instance_count}"
            ),
        );
    }

    fn draw_indirect(&self, primitive: Primitive, buffer: BufferId, offset: usize) {
        self.record(
            "draw_indirect",
            format!("primitive={primitive:?} buffer={} offset={offset}", buffer.0),
        );
    }
}
