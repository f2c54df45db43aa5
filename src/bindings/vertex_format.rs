// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vertex attribute layout descriptions.
//!
//! A vertex typically contains multiple attributes - position, normal, texture
//! coordinates, and so on.  [`VertexFormat`] describes which attributes are present,
//! their component types, and (after packing) the byte offset of each within one
//! vertex.  Vertex buffers copy the format they were allocated against, and the
//! attribute-binding cache walks it to wire buffer memory to shader locations.
//!
//! # Overview
//!
//! Registration is ordered: the first attribute added is the highest-priority owner
//! of its name when several bound buffers declare the same attribute.  Once
//! [`VertexFormat::pack`] runs, offsets and stride are frozen and further
//! registration is a programming error.
//!
//! # Example
//!
//! ```
//! use buffers_and_batches::bindings::vertex_format::{VertexFormat, ComponentType, FetchMode};
//!
//! let mut format = VertexFormat::new();
//! format.add_attribute("pos", ComponentType::F32, 3, FetchMode::Float);
//! format.add_attribute("uv", ComponentType::F32, 2, FetchMode::Float);
//! format.pack(4);
//!
//! assert_eq!(format.attribute(0).offset(), 0);
//! assert_eq!(format.attribute(1).offset(), 12);
//! assert_eq!(format.stride(), 20);
//! ```

/// Hard cap on attributes in one format, including multi-load copies.
pub const MAX_ATTRIBUTES: usize = 16;

/// How many names (one primary plus aliases) one attribute may carry.
pub const MAX_ATTRIBUTE_NAMES: usize = 4;

/// The scalar type of one attribute component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F16,
}

impl ComponentType {
    /// Size of one component in bytes.
    pub fn byte_size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 | ComponentType::F16 => 2,
            ComponentType::I32 | ComponentType::U32 | ComponentType::F32 => 4,
        }
    }

    fn is_float(self) -> bool {
        matches!(self, ComponentType::F32 | ComponentType::F16)
    }
}

/// How the shader reads an attribute's components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMode {
    /// Components are floating point and fetched as-is.
    Float,
    /// Integer components fetched as integers.
    Int,
    /// Integer components converted to float, keeping their magnitude.
    IntToFloat,
    /// Integer components normalized to the unit range.
    IntToFloatUnit,
}

/// One named, typed field within a vertex.
#[derive(Debug, Clone)]
pub struct Attribute {
    names: Vec<String>,
    comp_type: ComponentType,
    comp_len: u32,
    size: usize,
    offset: usize,
    fetch: FetchMode,
}

impl Attribute {
    /// The primary (first-registered) name.
    pub fn name(&self) -> &str {
        &self.names[0]
    }

    /// All names, primary first.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn comp_type(&self) -> ComponentType {
        self.comp_type
    }

    pub fn comp_len(&self) -> u32 {
        self.comp_len
    }

    /// Total attribute size in bytes.
    pub fn byte_size(&self) -> usize {
        self.size
    }

    /// Byte offset within one vertex.  Meaningful only after packing.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn fetch(&self) -> FetchMode {
        self.fetch
    }

    /// The byte alignment this attribute requires within a vertex.
    ///
    /// 3-component attributes with components of two bytes or fewer are aligned as
    /// if they had 4 components; hardware fetches them poorly otherwise.  Everything
    /// else is naturally aligned, subject to the backend's minimum stride.
    fn alignment(&self, minimum_stride: usize) -> usize {
        let comp_size = self.comp_type.byte_size();
        if self.comp_len == 3 && comp_size <= 2 {
            4 * comp_size
        } else {
            minimum_stride.max(comp_size)
        }
    }
}

fn padding(offset: usize, alignment: usize) -> usize {
    (alignment - (offset % alignment)) % alignment
}

/// Ordered set of the attributes in one vertex, with packed offsets and stride.
///
/// Built by the caller, copied into each vertex buffer that uses it.  See the
/// [module docs](self) for the lifecycle.
#[derive(Debug, Clone, Default)]
pub struct VertexFormat {
    attrs: Vec<Attribute>,
    stride: usize,
    packed: bool,
}

impl VertexFormat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attribute and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the format is already packed, if [`MAX_ATTRIBUTES`] are registered,
    /// if `comp_len` is outside `1..=4`, or if the fetch mode does not suit the
    /// component type (float components fetch as [`FetchMode::Float`]; integer
    /// components must not).
    pub fn add_attribute(
        &mut self,
        name: &str,
        comp_type: ComponentType,
        comp_len: u32,
        fetch: FetchMode,
    ) -> usize {
        assert!(!self.packed, "Format already packed");
        assert!(self.attrs.len() < MAX_ATTRIBUTES, "Too many attributes");
        assert!((1..=4).contains(&comp_len), "Invalid component count");
        if comp_type.is_float() {
            assert!(
                fetch == FetchMode::Float,
                "Float components require float fetch"
            );
        } else {
            assert!(
                fetch != FetchMode::Float,
                "Integer components cannot use float fetch"
            );
        }
        self.attrs.push(Attribute {
            names: vec![name.to_string()],
            comp_type,
            comp_len,
            size: comp_type.byte_size() * comp_len as usize,
            offset: 0,
            fetch,
        });
        self.attrs.len() - 1
    }

    /// Adds an alias for the most recently registered attribute.
    ///
    /// # Panics
    ///
    /// Panics if the format is packed or empty, or if the attribute already carries
    /// [`MAX_ATTRIBUTE_NAMES`] names.
    pub fn add_alias(&mut self, name: &str) {
        assert!(!self.packed, "Format already packed");
        let attr = self.attrs.last_mut().expect("No attribute to alias");
        assert!(
            attr.names.len() < MAX_ATTRIBUTE_NAMES,
            "Too many names on one attribute"
        );
        attr.names.push(name.to_string());
    }

    /// Assigns offsets and stride, then freezes the format.
    ///
    /// The first attribute sits at offset 0; each subsequent attribute is padded to
    /// its own alignment, and the stride carries trailing padding so every attribute
    /// of the *next* vertex is aligned too.  `minimum_stride` is the backend's
    /// minimum per-vertex fetch stride (see
    /// [`DriverLimits::minimum_vertex_stride`](crate::driver::DriverLimits::minimum_vertex_stride)).
    ///
    /// # Panics
    ///
    /// Panics if called twice or on an empty format.
    pub fn pack(&mut self, minimum_stride: usize) {
        assert!(!self.packed, "Format already packed");
        assert!(!self.attrs.is_empty(), "Cannot pack an empty format");
        assert!(minimum_stride >= 1, "Invalid minimum stride");
        let mut offset = 0;
        for (i, a) in self.attrs.iter_mut().enumerate() {
            if i > 0 {
                offset += padding(offset, a.alignment(minimum_stride));
            }
            a.offset = offset;
            offset += a.size;
        }
        let max_align = self
            .attrs
            .iter()
            .map(|a| a.alignment(minimum_stride))
            .max()
            .expect("attrs nonempty");
        self.stride = offset + padding(offset, max_align);
        self.packed = true;
    }

    /// Packs a format destined for a texture buffer.
    ///
    /// Texture buffers fetch tightly: minimum alignment 1, no padding.
    ///
    /// # Panics
    ///
    /// Panics unless the format holds exactly one attribute, or if already packed.
    pub fn pack_for_texture_buffer(&mut self) {
        assert!(!self.packed, "Format already packed");
        assert!(
            self.attrs.len() == 1,
            "Texture buffer formats hold exactly one attribute"
        );
        self.attrs[0].offset = 0;
        self.stride = self.attrs[0].size;
        self.packed = true;
    }

    /// Expands a packed format so a shader can fetch `load_count` consecutive
    /// vertices in one invocation.
    ///
    /// Every attribute gains `load_count - 1` aliased copies at
    /// `offset + i * stride`, named by suffixing the load index onto the attribute's
    /// first-registered name (`"pos"` gains `"pos1"`, `"pos2"`, ...).  The stride is
    /// unchanged; the caller binds the buffer with an element stride of
    /// `stride * load_count`.
    ///
    /// # Panics
    ///
    /// Panics if the format is not packed, if `load_count` is outside `2..=4`, or if
    /// the expansion would exceed [`MAX_ATTRIBUTES`].
    pub fn multi_load_expand(&mut self, load_count: usize) {
        assert!(self.packed, "Multi-load requires a packed format");
        assert!((2..=4).contains(&load_count), "Unsupported load count");
        let base_len = self.attrs.len();
        assert!(
            base_len * load_count <= MAX_ATTRIBUTES,
            "Too many attributes"
        );
        for i in 0..base_len {
            for j in 1..load_count {
                let source = &self.attrs[i];
                let copy = Attribute {
                    names: vec![format!("{}{}", source.name(), j)],
                    comp_type: source.comp_type,
                    comp_len: source.comp_len,
                    size: source.size,
                    offset: source.offset + self.stride * j,
                    fetch: source.fetch,
                };
                self.attrs.push(copy);
            }
        }
    }

    /// Finds the attribute carrying `name`, considering aliases.
    pub fn attribute_index_of(&self, name: &str) -> Option<usize> {
        self.attrs
            .iter()
            .position(|a| a.names.iter().any(|n| n == name))
    }

    pub fn attribute(&self, index: usize) -> &Attribute {
        &self.attrs[index]
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn attribute_len(&self) -> usize {
        self.attrs.len()
    }

    /// Bytes per vertex.  Meaningful only after packing.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_short_components_align_as_four() {
        let mut format = VertexFormat::new();
        format.add_attribute("a", ComponentType::U8, 1, FetchMode::Int);
        format.add_attribute("b", ComponentType::U16, 3, FetchMode::IntToFloatUnit);
        format.pack(1);
        // b wants 4 * 2 = 8 byte alignment
        assert_eq!(format.attribute(1).offset(), 8);
        assert_eq!(format.stride() % 8, 0);
    }

    #[test]
    fn texture_buffer_packs_tight() {
        let mut format = VertexFormat::new();
        format.add_attribute("value", ComponentType::U8, 1, FetchMode::Int);
        format.pack_for_texture_buffer();
        assert_eq!(format.stride(), 1);
    }

    #[test]
    #[should_panic(expected = "already packed")]
    fn registration_after_pack_is_fatal() {
        let mut format = VertexFormat::new();
        format.add_attribute("pos", ComponentType::F32, 3, FetchMode::Float);
        format.pack(4);
        format.add_attribute("late", ComponentType::F32, 1, FetchMode::Float);
    }

    #[test]
    fn multi_load_aliases_every_attribute() {
        let mut format = VertexFormat::new();
        format.add_attribute("pos", ComponentType::F32, 2, FetchMode::Float);
        format.add_attribute("uv", ComponentType::F32, 2, FetchMode::Float);
        format.pack(4);
        let stride = format.stride();
        format.multi_load_expand(2);
        assert_eq!(format.attribute_len(), 4);
        let pos1 = format.attribute_index_of("pos1").expect("pos1");
        assert_eq!(format.attribute(pos1).offset(), stride);
        let uv1 = format.attribute_index_of("uv1").expect("uv1");
        assert_eq!(format.attribute(uv1).offset(), 8 + stride);
    }

    #[test]
    fn aliases_resolve_to_the_same_attribute() {
        let mut format = VertexFormat::new();
        format.add_attribute("pos", ComponentType::F32, 3, FetchMode::Float);
        format.add_alias("position");
        assert_eq!(format.attribute_index_of("position"), Some(0));
        assert_eq!(format.attribute_index_of("pos"), Some(0));
    }
}
