/*! buffers_and_batches is a GPU resource and draw-call abstraction layer that sits
  between a renderer and a native graphics driver.

Drivers punish redundant state changes and cross-context object use.  The job of this
crate is to give a renderer a uniform, safe-to-call-anywhere API while deferring and
batching the actual driver traffic: vertex data is described once and packed tightly,
buffers stage their bytes host-side until first use, pipeline state is diffed so only
the delta reaches the driver, and draw calls go through a cached attribute-binding
object keyed by shader interface.

Here is a quick chart of the main object families:

| Family                  | Types                                                        | Driver traffic                                        |
|-------------------------|--------------------------------------------------------------|-------------------------------------------------------|
| Vertex descriptions     | [`bindings::vertex_format::VertexFormat`]                    | None; consumed by buffers and binding caches          |
| Buffers                 | Vertex, index, uniform, storage buffers in [`bindings`]      | Deferred; uploaded at first use, sized to used length |
| Shader descriptors      | [`pipeline::create_info::ShaderCreateInfo`] + source registry | None until compiled                                   |
| Shaders                 | [`pipeline::shader::Shader`]                                 | One compile/link; immutable interface table after     |
| Global state            | [`pipeline::state::StateManager`]                            | XOR-diffed; one call per changed group per apply      |
| Batches                 | [`pipeline::batch::Batch`]                                   | One draw; binding object resolved from a cache        |
| Contexts                | [`context::Context`]                                         | Activation drains cross-thread deletion queues        |

# Data flow

Build a [`bindings::vertex_format::VertexFormat`] and pack it, allocate buffers
against it, describe a shader with a [`pipeline::create_info::ShaderCreateInfo`],
compile it, assemble a [`pipeline::batch::Batch`] from the buffers and shader, and
draw.  The batch applies pending global state, uploads any dirty buffers, resolves
its attribute-binding object, derives draw parameters, and submits.

# Backends

The native driver is reached through the [`driver::Driver`] trait: the full surface
of object-creation, state-setting, and draw-submission entry points.  This crate
ships [`driver::trace::TraceDriver`], a headless implementation that allocates ids
and records every entry point; it backs the test suite and any CI that has no GPU.
A real native-API backend is an external implementation of the same trait.

Window systems are likewise out of scope: the crate only needs an opaque surface it
can make current, measure, and swap, via [`surface::NativeSurface`].

# Threading

There are no internal threads and nothing is async.  Each context is usable by one
thread at a time; buffers, textures, and programs are driver-global and may be
created and freed from any thread, while attribute-binding objects and framebuffers
are private to the context that created them.  Deleting a context-private object
from the wrong thread queues it on the owning context's orphan list, drained the
next time that context is activated.

*/

pub mod bindings;
pub mod context;
pub mod driver;
pub mod pipeline;
pub mod surface;
