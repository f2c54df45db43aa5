// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The native-graphics-driver boundary.

Everything above this module is backend-agnostic; everything the crate wants from a
native API goes through [`Driver`].  The trait carries the full surface of
object-creation, state-setting, and draw-submission entry points, so a backend is one
`impl Driver` and no `cfg` soup anywhere else.

Object ids come in two flavors with different threading rules:

- buffers, textures, and programs are driver-global.  Any thread holding the driver
  handle may create and delete them.
- vertex-array and framebuffer ids are private to the context that created them and
  must only be deleted by it.  Cross-thread deletion goes through the owning
  context's orphan list (see [`crate::context`]), never through this trait directly.

[`trace::TraceDriver`] is the built-in headless implementation; it allocates ids,
services read-backs from host memory, and records every entry point into a log the
test suite inspects.
*/

use crate::bindings::UsageClass;
use crate::bindings::index_buffer::IndexKind;
use crate::bindings::vertex_format::{ComponentType, FetchMode};
use crate::pipeline::Primitive;
use crate::pipeline::state::{
    Blend, Culling, DepthTest, ProvokingVertex, StencilOp, StencilTest, WriteMask,
};

pub mod trace;

/// Driver-global buffer object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Driver-global texture object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl TextureId {
    /// The "nothing bound" texture, used to fill holes in batched unit binds.
    pub const NONE: TextureId = TextureId(0);
}

/// Driver-global program object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Context-private attribute-binding object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub u32);

/// Context-private framebuffer object id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// What a buffer object is for.  Some backends key allocation behavior off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Index,
    Uniform,
    Storage,
    Indirect,
}

/// Backend-reported capabilities and limits.
///
/// Queried once through [`Driver::limits`] and threaded through the components that
/// validate against it.  Binding above a reported slot limit is a recoverable error;
/// see [`crate::bindings::uniform_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverLimits {
    pub max_texture_units: u32,
    pub max_uniform_buffer_slots: u32,
    pub max_storage_buffer_slots: u32,
    pub max_vertex_attributes: u32,
    /// Whether the backend can bind a contiguous range of texture units in one call.
    pub supports_multi_bind: bool,
    pub supports_compute: bool,
    /// Minimum per-vertex stride the hardware can fetch; see
    /// [`crate::bindings::vertex_format::VertexFormat::pack`].
    pub minimum_vertex_stride: u32,
}

impl Default for DriverLimits {
    fn default() -> Self {
        DriverLimits {
            max_texture_units: 32,
            max_uniform_buffer_slots: 16,
            max_storage_buffer_slots: 8,
            max_vertex_attributes: 16,
            supports_multi_bind: true,
            supports_compute: true,
            minimum_vertex_stride: 4,
        }
    }
}

/// How one attribute location reads from a bound buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePointer {
    pub offset: usize,
    pub stride: usize,
    pub comp_type: ComponentType,
    pub comp_len: u32,
    pub fetch: FetchMode,
    /// 0 for per-vertex data, 1 for per-instance data.
    pub divisor: u32,
}

/// Assembled per-stage compilation units handed to [`Driver::program_create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSources {
    pub vertex: Option<String>,
    pub fragment: Option<String>,
    pub geometry: Option<String>,
    pub compute: Option<String>,
}

impl StageSources {
    pub fn is_compute(&self) -> bool {
        self.compute.is_some()
    }
}

/// Framebuffer attachment points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    Color(u32),
    Depth,
    Stencil,
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    Unsupported,
}

impl FramebufferStatus {
    /// Status text for an incomplete framebuffer, `None` when complete.
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            FramebufferStatus::Complete => None,
            FramebufferStatus::IncompleteAttachment => Some("incomplete attachment"),
            FramebufferStatus::MissingAttachment => Some("no attachments"),
            FramebufferStatus::Unsupported => Some("attachment combination unsupported"),
        }
    }
}

/// The full surface of native-driver entry points this crate issues.
///
/// Implementations must be callable from any thread; the caller upholds the
/// context-affinity rules for vertex-array and framebuffer ids described in the
/// module docs.
///
/// # Failure contract
///
/// [`program_create`](Driver::program_create) is the only fallible entry point.  On
/// failure it returns the captured diagnostic text and must have torn down every
/// partially-built stage object before returning; no half-constructed program id may
/// escape.
pub trait Driver: Send + Sync + std::fmt::Debug {
    fn limits(&self) -> DriverLimits;

    fn buffer_create(
        &self,
        target: BufferTarget,
        len: usize,
        data: Option<&[u8]>,
        usage: UsageClass,
    ) -> BufferId;
    fn buffer_update(&self, buffer: BufferId, offset: usize, data: &[u8]);
    fn buffer_read(&self, buffer: BufferId, offset: usize, out: &mut [u8]);
    fn buffer_clear(&self, buffer: BufferId);
    fn buffer_delete(&self, buffer: BufferId);
    fn buffer_bind_range(
        &self,
        target: BufferTarget,
        slot: u32,
        buffer: BufferId,
        offset: usize,
        len: usize,
    );

    fn vertex_array_create(&self) -> VertexArrayId;
    fn vertex_array_attribute(
        &self,
        vao: VertexArrayId,
        location: u32,
        buffer: BufferId,
        pointer: AttributePointer,
    );
    fn vertex_array_index_buffer(&self, vao: VertexArrayId, buffer: BufferId);
    fn vertex_array_bind(&self, vao: VertexArrayId);
    fn vertex_array_delete(&self, vao: VertexArrayId);

    fn program_create(&self, sources: &StageSources) -> Result<ProgramId, String>;
    fn program_bind(&self, program: ProgramId);
    fn program_delete(&self, program: ProgramId);
    fn program_uniform_f32(&self, program: ProgramId, location: u32, values: &[f32]);
    fn program_uniform_i32(&self, program: ProgramId, location: u32, values: &[i32]);

    fn set_blend(&self, blend: Blend);
    fn set_write_mask(&self, mask: WriteMask);
    fn set_culling(&self, culling: Culling);
    fn set_depth_test(&self, test: DepthTest);
    fn set_stencil(&self, test: StencilTest, op: StencilOp);
    fn set_provoking_vertex(&self, provoking: ProvokingVertex);
    fn set_clip_distances(&self, count: u32);
    fn set_line_width(&self, width: f32);
    fn set_depth_range(&self, near: f32, far: f32);
    fn set_point_size(&self, size: f32);
    fn set_stencil_values(&self, reference: u8, compare_mask: u8, write_mask: u8);

    fn texture_bind_unit(&self, unit: u32, texture: TextureId);
    /// Batched bind of a contiguous unit range; only called when
    /// [`DriverLimits::supports_multi_bind`] is set.
    fn texture_bind_units(&self, first: u32, textures: &[TextureId]);
    fn texture_delete(&self, texture: TextureId);

    fn framebuffer_create(&self) -> FramebufferId;
    fn framebuffer_attach(
        &self,
        framebuffer: FramebufferId,
        attachment: Attachment,
        texture: TextureId,
    );
    fn framebuffer_check(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    fn framebuffer_bind(&self, framebuffer: FramebufferId);
    fn framebuffer_delete(&self, framebuffer: FramebufferId);

    fn draw(&self, primitive: Primitive, first: u32, count: u32, instance_count: u32);
    #[allow(clippy::too_many_arguments)]
    fn draw_indexed(
        &self,
        primitive: Primitive,
        kind: IndexKind,
        first: u32,
        count: u32,
        base_index: i32,
        instance_count: u32,
    );
    fn draw_indirect(&self, primitive: Primitive, buffer: BufferId, offset: usize);
}
