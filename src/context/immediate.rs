// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Immediate mode: streaming small draws through a rotating scratch buffer.
//!
//! [`Context::immediate_begin`] checks out a writer for a fixed number of
//! vertices.  Attribute values are written per vertex; [`ImmediateDrawer::end`]
//! copies the span into the context's scratch ring and issues the draw through a
//! transient attribute binding.  When the ring wraps, the previous device storage
//! is orphaned and replaced rather than stalled on.

use std::sync::Arc;

use crate::bindings::UsageClass;
use crate::bindings::vertex_format::{ComponentType, VertexFormat};
use crate::context::Context;
use crate::driver::{AttributePointer, BufferId, BufferTarget, Driver};
use crate::pipeline::Primitive;
use crate::pipeline::shader::Shader;

pub(crate) const SCRATCH_CAPACITY: usize = 256 * 1024;

#[derive(Debug)]
pub(crate) struct ImmediateScratch {
    buffer: Option<BufferId>,
    cursor: usize,
}

impl ImmediateScratch {
    pub(crate) fn new() -> Self {
        ImmediateScratch {
            buffer: None,
            cursor: 0,
        }
    }

    pub(crate) fn take_buffer(&mut self) -> Option<BufferId> {
        self.buffer.take()
    }
}

fn align_up(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

impl Context {
    /// Begins an immediate draw of exactly `vertex_len` vertices.
    ///
    /// An unpacked `format` is packed against the driver's minimum stride.
    ///
    /// # Panics
    ///
    /// Panics if the vertex span exceeds the scratch capacity.
    pub fn immediate_begin(
        &self,
        shader: Arc<Shader>,
        mut format: VertexFormat,
        primitive: Primitive,
        vertex_len: usize,
    ) -> ImmediateDrawer<'_> {
        if !format.is_packed() {
            format.pack(self.driver().limits().minimum_vertex_stride as usize);
        }
        let bytes = vertex_len * format.stride();
        assert!(
            bytes <= SCRATCH_CAPACITY,
            "Immediate draw exceeds scratch capacity"
        );
        ImmediateDrawer {
            ctx: self,
            shader,
            format,
            primitive,
            vertex_len,
            current: 0,
            data: vec![0; bytes],
        }
    }
}

/// Writer for one immediate draw.  Fill every vertex, then [`end`](Self::end).
#[derive(Debug)]
pub struct ImmediateDrawer<'a> {
    ctx: &'a Context,
    shader: Arc<Shader>,
    format: VertexFormat,
    primitive: Primitive,
    vertex_len: usize,
    current: usize,
    data: Vec<u8>,
}

impl ImmediateDrawer<'_> {
    /// Writes a float attribute of the current vertex.
    ///
    /// # Panics
    ///
    /// Panics past the declared vertex count, on a component count mismatch, or if
    /// the attribute's components are not floating point.
    pub fn attr_f32(&mut self, attr: usize, values: &[f32]) {
        assert!(self.current < self.vertex_len, "Vertex overflow");
        let attribute = self.format.attribute(attr);
        assert_eq!(
            values.len(),
            attribute.comp_len() as usize,
            "Component count mismatch"
        );
        let bytes: Vec<u8> = match attribute.comp_type() {
            ComponentType::F32 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ComponentType::F16 => values
                .iter()
                .flat_map(|v| half::f16::from_f32(*v).to_le_bytes())
                .collect(),
            other => panic!("Float write into {other:?} components"),
        };
        let dst = self.current * self.format.stride() + attribute.offset();
        self.data[dst..dst + bytes.len()].copy_from_slice(&bytes);
    }

    /// Advances to the next vertex.
    pub fn next_vertex(&mut self) {
        self.current += 1;
        assert!(self.current <= self.vertex_len, "Vertex overflow");
    }

    /// Uploads the written span into the scratch ring and draws it.
    ///
    /// # Panics
    ///
    /// Panics unless every declared vertex was written.
    pub fn end(self) {
        assert!(self.current == self.vertex_len, "Immediate draw underfilled");
        if self.vertex_len == 0 {
            return;
        }
        let driver = self.ctx.driver().clone();
        let stride = self.format.stride();
        let bytes = self.data.len();

        let (buffer, offset) = {
            let mut scratch = self.ctx.immediate_scratch();
            let fits = scratch
                .buffer
                .is_some_and(|_| scratch.cursor + bytes <= SCRATCH_CAPACITY);
            if !fits {
                // wrap: orphan the old storage instead of waiting on it
                if let Some(old) = scratch.buffer.take() {
                    driver.buffer_delete(old);
                }
                scratch.buffer = Some(driver.buffer_create(
                    BufferTarget::Vertex,
                    SCRATCH_CAPACITY,
                    None,
                    UsageClass::Stream,
                ));
                scratch.cursor = 0;
            }
            let buffer = scratch.buffer.expect("scratch buffer exists");
            let offset = scratch.cursor;
            scratch.cursor = align_up(offset + bytes, 16);
            (buffer, offset)
        };
        driver.buffer_update(buffer, offset, &self.data);

        self.ctx.state().apply(&*driver);
        let interface = self.shader.interface();
        let vao = driver.vertex_array_create();
        let mut matched = 0u32;
        for attr in self.format.attributes() {
            for name in attr.names() {
                if let Some(input) = interface.attribute(name) {
                    driver.vertex_array_attribute(
                        vao,
                        input.location,
                        buffer,
                        AttributePointer {
                            offset: offset + attr.offset(),
                            stride,
                            comp_type: attr.comp_type(),
                            comp_len: attr.comp_len(),
                            fetch: attr.fetch(),
                            divisor: 0,
                        },
                    );
                    matched |= 1 << input.location;
                }
            }
        }
        for input in interface.attributes() {
            if matched & (1 << input.location) == 0 {
                driver.vertex_array_attribute(
                    vao,
                    input.location,
                    self.ctx.zero_buffer(),
                    AttributePointer {
                        offset: 0,
                        stride: 0,
                        comp_type: ComponentType::F32,
                        comp_len: 4,
                        fetch: crate::bindings::vertex_format::FetchMode::Float,
                        divisor: 0,
                    },
                );
            }
        }
        driver.program_bind(self.shader.program());
        driver.vertex_array_bind(vao);
        driver.draw(self.primitive, 0, self.vertex_len as u32, 1);
        // transient binding, created under the active context
        driver.vertex_array_delete(vao);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Driver;
    use crate::driver::trace::TraceDriver;
    use crate::pipeline::create_info::{CreateInfoRegistry, ShaderCreateInfo, VarType};
    use crate::pipeline::sources::SourceRegistry;

    fn fixture() -> (
        std::sync::Arc<TraceDriver>,
        std::sync::Arc<Context>,
        Arc<Shader>,
        VertexFormat,
    ) {
        let trace = TraceDriver::new();
        let driver: Arc<dyn Driver> = trace.clone();
        let ctx = Context::new(driver.clone());
        let mut sources = SourceRegistry::new();
        sources.register("vs", "void main() {}\n");
        sources.register("fs", "void main() {}\n");
        let mut registry = CreateInfoRegistry::new();
        let mut info = ShaderCreateInfo::new("imm");
        info.vertex_source("vs")
            .fragment_source("fs")
            .vertex_in(0, VarType::Vec2, "pos");
        registry.register(info);
        let shader = Shader::from_create_info("imm", &mut registry, &sources, &driver)
            .expect("shader");
        let mut format = VertexFormat::new();
        format.add_attribute("pos", ComponentType::F32, 2, crate::bindings::vertex_format::FetchMode::Float);
        (trace, ctx, shader, format)
    }

    fn triangle(ctx: &Context, shader: &Arc<Shader>, format: &VertexFormat) {
        let mut draw = ctx.immediate_begin(shader.clone(), format.clone(), Primitive::Triangles, 3);
        for corner in [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] {
            draw.attr_f32(0, &corner);
            draw.next_vertex();
        }
        draw.end();
    }

    #[test]
    fn scratch_storage_is_reused_across_draws() {
        let (trace, ctx, shader, format) = fixture();
        trace.take_log();
        triangle(&ctx, &shader, &format);
        assert_eq!(trace.count_calls("buffer_create"), 1);
        assert_eq!(trace.count_calls("draw"), 1);
        triangle(&ctx, &shader, &format);
        // second draw streams into the same scratch at a later offset
        assert_eq!(trace.count_calls("buffer_create"), 1);
        assert_eq!(trace.count_calls("buffer_update"), 2);
        assert_eq!(trace.count_calls("draw"), 2);
    }

    #[test]
    #[should_panic(expected = "underfilled")]
    fn ending_early_is_fatal() {
        let (_trace, ctx, shader, format) = fixture();
        let mut draw = ctx.immediate_begin(shader, format, Primitive::Triangles, 3);
        draw.attr_f32(0, &[0.0, 0.0]);
        draw.next_vertex();
        draw.end();
    }
}
