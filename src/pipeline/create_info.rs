// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Declarative, composable shader descriptors.
//!
//! A [`ShaderCreateInfo`] describes a shader's stage sources (as names into a
//! [`SourceRegistry`](crate::pipeline::sources::SourceRegistry)), vertex inputs,
//! fragment outputs, push constants, and bound resources.  Descriptors compose:
//! one may reference others by name, and [`finalize`](ShaderCreateInfo::finalize)
//! recursively finalizes and merges every referenced descriptor before validating
//! the result.
//!
//! # Merge rules
//!
//! - List fields concatenate; typedef sources deduplicate.
//! - Singleton fields (the four stage sources, the compute local size) conflict if
//!   already set; the conflict is reported, never silently resolved.
//! - Booleans that mean "stricter" (early fragment test) only ever turn on.
//! - A descriptor referenced more than once in a merge - including through a cycle -
//!   is reported as a duplicate.
//!
//! With auto resource location enabled, binding slots are reassigned per resource
//! kind in declaration order.  Otherwise slot collisions across the merged set are
//! a reported validation error.
//!
//! # Example
//!
//! ```
//! use buffers_and_batches::pipeline::create_info::{
//!     CreateInfoRegistry, Frequency, ShaderCreateInfo, VarType,
//! };
//!
//! let mut registry = CreateInfoRegistry::new();
//! let mut lighting = ShaderCreateInfo::new("lighting_data");
//! lighting.uniform_buffer(Frequency::Pass, 0, "LightData", "lights");
//! registry.register(lighting);
//!
//! let mut info = ShaderCreateInfo::new("surface_shader");
//! info.vertex_source("surface_vert")
//!     .fragment_source("surface_frag")
//!     .vertex_in(0, VarType::Vec3, "pos")
//!     .vertex_in(1, VarType::Vec2, "uv")
//!     .additional_info("lighting_data");
//! info.finalize(&mut registry).expect("merges cleanly");
//! assert_eq!(info.resources().count(), 1);
//! ```

use std::collections::HashMap;

/// Data type of a vertex input, fragment output, push constant, or interface
/// member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
    IVec2,
    IVec3,
    IVec4,
    Uint,
    UVec2,
    UVec3,
    UVec4,
    Bool,
    Mat3,
    Mat4,
}

impl VarType {
    /// How many consecutive vertex-attribute indices a value of this type consumes.
    pub fn attribute_span(self) -> u32 {
        match self {
            VarType::Mat4 => 4,
            VarType::Mat3 => 3,
            _ => 1,
        }
    }
}

/// How often a resource is rebound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Bound once per pass.
    Pass,
    /// Rebound per batch.
    Batch,
}

/// The kind of a bound resource.  Slot namespaces are per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    UniformBuffer,
    StorageBuffer,
    Sampler,
    Image,
}

/// One resource binding declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub slot: u32,
    pub type_name: String,
    pub name: String,
}

/// One vertex attribute input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexInput {
    pub index: u32,
    pub var_type: VarType,
    pub name: String,
}

/// One fragment output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentOutput {
    pub index: u32,
    pub var_type: VarType,
    pub name: String,
}

/// One push constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConstant {
    pub var_type: VarType,
    pub name: String,
    /// 0 for a scalar.
    pub array_len: u32,
}

/// An interface block shared between stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBlock {
    pub name: String,
    pub instance: String,
    pub members: Vec<(VarType, String)>,
}

/// Validation failures surfaced by [`ShaderCreateInfo::finalize`].
#[derive(Debug, thiserror::Error)]
pub enum CreateInfoError {
    #[error("Unknown create info '{0}'")]
    UnknownInfo(String),
    #[error("Create info '{info}' referenced more than once in merge")]
    DuplicateReference { info: String },
    #[error("{stage} source already set while merging '{from}'")]
    StageSourceConflict { stage: &'static str, from: String },
    #[error("Compute local size already set while merging '{from}'")]
    ComputeLayoutConflict { from: String },
    #[error("{kind:?} slot {slot} declared by both '{first}' and '{second}'")]
    SlotCollision {
        kind: ResourceKind,
        slot: u32,
        first: String,
        second: String,
    },
}

/// A mergeable shader descriptor.  See the [module docs](self).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderCreateInfo {
    name: String,
    vertex_source: Option<String>,
    fragment_source: Option<String>,
    geometry_source: Option<String>,
    compute_source: Option<String>,
    compute_local_size: Option<[u32; 3]>,
    vertex_inputs: Vec<VertexInput>,
    fragment_outputs: Vec<FragmentOutput>,
    push_constants: Vec<PushConstant>,
    pass_resources: Vec<Resource>,
    batch_resources: Vec<Resource>,
    typedef_sources: Vec<String>,
    defines: Vec<(String, String)>,
    interfaces: Vec<InterfaceBlock>,
    additional_infos: Vec<String>,
    early_fragment_test: bool,
    auto_resource_location: bool,
    finalized: bool,
}

impl ShaderCreateInfo {
    pub fn new(name: &str) -> Self {
        ShaderCreateInfo {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_source(&mut self, fragment_name: &str) -> &mut Self {
        self.vertex_source = Some(fragment_name.to_string());
        self
    }

    pub fn fragment_source(&mut self, fragment_name: &str) -> &mut Self {
        self.fragment_source = Some(fragment_name.to_string());
        self
    }

    pub fn geometry_source(&mut self, fragment_name: &str) -> &mut Self {
        self.geometry_source = Some(fragment_name.to_string());
        self
    }

    pub fn compute_source(&mut self, fragment_name: &str) -> &mut Self {
        self.compute_source = Some(fragment_name.to_string());
        self
    }

    pub fn local_group_size(&mut self, x: u32, y: u32, z: u32) -> &mut Self {
        self.compute_local_size = Some([x, y, z]);
        self
    }

    pub fn vertex_in(&mut self, index: u32, var_type: VarType, name: &str) -> &mut Self {
        self.vertex_inputs.push(VertexInput {
            index,
            var_type,
            name: name.to_string(),
        });
        self
    }

    pub fn fragment_out(&mut self, index: u32, var_type: VarType, name: &str) -> &mut Self {
        self.fragment_outputs.push(FragmentOutput {
            index,
            var_type,
            name: name.to_string(),
        });
        self
    }

    pub fn push_constant(&mut self, var_type: VarType, name: &str) -> &mut Self {
        self.push_constant_array(var_type, name, 0)
    }

    pub fn push_constant_array(&mut self, var_type: VarType, name: &str, array_len: u32) -> &mut Self {
        self.push_constants.push(PushConstant {
            var_type,
            name: name.to_string(),
            array_len,
        });
        self
    }

    pub fn uniform_buffer(
        &mut self,
        frequency: Frequency,
        slot: u32,
        type_name: &str,
        name: &str,
    ) -> &mut Self {
        self.resource(frequency, ResourceKind::UniformBuffer, slot, type_name, name)
    }

    pub fn storage_buffer(
        &mut self,
        frequency: Frequency,
        slot: u32,
        type_name: &str,
        name: &str,
    ) -> &mut Self {
        self.resource(frequency, ResourceKind::StorageBuffer, slot, type_name, name)
    }

    pub fn sampler(
        &mut self,
        frequency: Frequency,
        slot: u32,
        type_name: &str,
        name: &str,
    ) -> &mut Self {
        self.resource(frequency, ResourceKind::Sampler, slot, type_name, name)
    }

    pub fn image(
        &mut self,
        frequency: Frequency,
        slot: u32,
        type_name: &str,
        name: &str,
    ) -> &mut Self {
        self.resource(frequency, ResourceKind::Image, slot, type_name, name)
    }

    fn resource(
        &mut self,
        frequency: Frequency,
        kind: ResourceKind,
        slot: u32,
        type_name: &str,
        name: &str,
    ) -> &mut Self {
        let resource = Resource {
            kind,
            slot,
            type_name: type_name.to_string(),
            name: name.to_string(),
        };
        match frequency {
            Frequency::Pass => self.pass_resources.push(resource),
            Frequency::Batch => self.batch_resources.push(resource),
        }
        self
    }

    pub fn typedef_source(&mut self, fragment_name: &str) -> &mut Self {
        self.typedef_sources.push(fragment_name.to_string());
        self
    }

    pub fn define(&mut self, name: &str, value: &str) -> &mut Self {
        self.defines.push((name.to_string(), value.to_string()));
        self
    }

    pub fn interface(&mut self, block: InterfaceBlock) -> &mut Self {
        self.interfaces.push(block);
        self
    }

    /// References another descriptor to merge in at finalize time.
    pub fn additional_info(&mut self, name: &str) -> &mut Self {
        self.additional_infos.push(name.to_string());
        self
    }

    /// Forces early fragment tests.  Merging can only turn this on.
    pub fn early_fragment_test(&mut self, yes: bool) -> &mut Self {
        self.early_fragment_test |= yes;
        self
    }

    /// Enables per-kind automatic binding slot assignment at finalize time.
    pub fn auto_resource_location(&mut self, yes: bool) -> &mut Self {
        self.auto_resource_location |= yes;
        self
    }

    // -- finalized accessors ------------------------------------------------

    pub fn vertex_source_name(&self) -> Option<&str> {
        self.vertex_source.as_deref()
    }

    pub fn fragment_source_name(&self) -> Option<&str> {
        self.fragment_source.as_deref()
    }

    pub fn geometry_source_name(&self) -> Option<&str> {
        self.geometry_source.as_deref()
    }

    pub fn compute_source_name(&self) -> Option<&str> {
        self.compute_source.as_deref()
    }

    pub fn compute_local_size(&self) -> Option<[u32; 3]> {
        self.compute_local_size
    }

    pub fn vertex_inputs(&self) -> &[VertexInput] {
        &self.vertex_inputs
    }

    pub fn fragment_outputs(&self) -> &[FragmentOutput] {
        &self.fragment_outputs
    }

    pub fn push_constants(&self) -> &[PushConstant] {
        &self.push_constants
    }

    /// Pass-frequency then batch-frequency resources, each in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.pass_resources.iter().chain(self.batch_resources.iter())
    }

    pub fn typedef_sources(&self) -> &[String] {
        &self.typedef_sources
    }

    pub fn defines(&self) -> &[(String, String)] {
        &self.defines
    }

    pub fn interfaces(&self) -> &[InterfaceBlock] {
        &self.interfaces
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn has_early_fragment_test(&self) -> bool {
        self.early_fragment_test
    }

    // -- merge --------------------------------------------------------------

    /// Resolves every referenced descriptor, merges, and validates.
    ///
    /// Idempotent: a finalized descriptor returns immediately.
    ///
    /// # Panics
    ///
    /// Overlapping vertex-attribute index ranges (a mat4 input reserves 4
    /// consecutive indices) are a programming error and panic; everything else is
    /// reported through [`CreateInfoError`].
    pub fn finalize(&mut self, registry: &mut CreateInfoRegistry) -> Result<(), CreateInfoError> {
        let mut merge_set = vec![self.name.clone()];
        self.finalize_with_set(registry, &mut merge_set)
    }

    fn finalize_with_set(
        &mut self,
        registry: &mut CreateInfoRegistry,
        merge_set: &mut Vec<String>,
    ) -> Result<(), CreateInfoError> {
        if self.finalized {
            return Ok(());
        }
        let additional = self.additional_infos.clone();
        for info_name in &additional {
            if merge_set.iter().any(|n| n == info_name) {
                return Err(CreateInfoError::DuplicateReference {
                    info: info_name.clone(),
                });
            }
            merge_set.push(info_name.clone());
            let mut other = registry
                .take(info_name)
                .ok_or_else(|| CreateInfoError::UnknownInfo(info_name.clone()))?;
            let finalized = other.finalize_with_set(registry, merge_set);
            let merged = match &finalized {
                Ok(()) => self.merge_from(&other),
                Err(_) => Ok(()),
            };
            registry.put_back(other);
            finalized?;
            merged?;
        }
        self.assign_or_validate_slots()?;
        self.validate_vertex_inputs();
        self.finalized = true;
        Ok(())
    }

    fn merge_from(&mut self, other: &ShaderCreateInfo) -> Result<(), CreateInfoError> {
        let singletons: [(&'static str, &Option<String>, &mut Option<String>); 4] = [
            ("Vertex", &other.vertex_source, &mut self.vertex_source),
            ("Fragment", &other.fragment_source, &mut self.fragment_source),
            ("Geometry", &other.geometry_source, &mut self.geometry_source),
            ("Compute", &other.compute_source, &mut self.compute_source),
        ];
        for (stage, theirs, ours) in singletons {
            if let Some(source) = theirs {
                if ours.is_some() {
                    return Err(CreateInfoError::StageSourceConflict {
                        stage,
                        from: other.name.clone(),
                    });
                }
                *ours = Some(source.clone());
            }
        }
        if let Some(size) = other.compute_local_size {
            if self.compute_local_size.is_some() {
                return Err(CreateInfoError::ComputeLayoutConflict {
                    from: other.name.clone(),
                });
            }
            self.compute_local_size = Some(size);
        }
        self.vertex_inputs.extend(other.vertex_inputs.iter().cloned());
        self.fragment_outputs
            .extend(other.fragment_outputs.iter().cloned());
        self.push_constants
            .extend(other.push_constants.iter().cloned());
        self.pass_resources
            .extend(other.pass_resources.iter().cloned());
        self.batch_resources
            .extend(other.batch_resources.iter().cloned());
        self.interfaces.extend(other.interfaces.iter().cloned());
        self.defines.extend(other.defines.iter().cloned());
        for typedef in &other.typedef_sources {
            if !self.typedef_sources.contains(typedef) {
                self.typedef_sources.push(typedef.clone());
            }
        }
        self.early_fragment_test |= other.early_fragment_test;
        self.auto_resource_location |= other.auto_resource_location;
        Ok(())
    }

    fn assign_or_validate_slots(&mut self) -> Result<(), CreateInfoError> {
        if self.auto_resource_location {
            let mut counters: HashMap<ResourceKind, u32> = HashMap::new();
            for resource in self
                .pass_resources
                .iter_mut()
                .chain(self.batch_resources.iter_mut())
            {
                let counter = counters.entry(resource.kind).or_insert(0);
                resource.slot = *counter;
                *counter += 1;
            }
            return Ok(());
        }
        let mut seen: HashMap<(ResourceKind, u32), String> = HashMap::new();
        for resource in self.pass_resources.iter().chain(self.batch_resources.iter()) {
            if let Some(first) = seen.insert((resource.kind, resource.slot), resource.name.clone())
            {
                return Err(CreateInfoError::SlotCollision {
                    kind: resource.kind,
                    slot: resource.slot,
                    first,
                    second: resource.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_vertex_inputs(&self) {
        let mut occupied: u32 = 0;
        for input in &self.vertex_inputs {
            let span = input.var_type.attribute_span();
            assert!(
                input.index + span <= 16,
                "Vertex input index out of range"
            );
            for index in input.index..input.index + span {
                assert!(
                    occupied & (1 << index) == 0,
                    "Overlapping vertex input indices"
                );
                occupied |= 1 << index;
            }
        }
    }
}

/// Explicit process-scoped registry of named descriptors.
///
/// Passed by reference to the components that need it; there is no ambient global.
#[derive(Debug, Default)]
pub struct CreateInfoRegistry {
    infos: HashMap<String, ShaderCreateInfo>,
}

impl CreateInfoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor under its name.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate name.
    pub fn register(&mut self, info: ShaderCreateInfo) {
        let name = info.name.clone();
        let old = self.infos.insert(name, info);
        assert!(old.is_none(), "Duplicate create info name");
    }

    pub fn get(&self, name: &str) -> Option<&ShaderCreateInfo> {
        self.infos.get(name)
    }

    /// Finalizes the named descriptor in place.
    pub fn finalize(&mut self, name: &str) -> Result<(), CreateInfoError> {
        let mut info = self
            .take(name)
            .ok_or_else(|| CreateInfoError::UnknownInfo(name.to_string()))?;
        let mut merge_set = vec![info.name.clone()];
        let result = info.finalize_with_set(self, &mut merge_set);
        self.put_back(info);
        result
    }

    fn take(&mut self, name: &str) -> Option<ShaderCreateInfo> {
        self.infos.remove(name)
    }

    fn put_back(&mut self, info: ShaderCreateInfo) {
        self.infos.insert(info.name.clone(), info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_is_reported_as_duplicate_reference() {
        let mut registry = CreateInfoRegistry::new();
        let mut a = ShaderCreateInfo::new("a");
        a.additional_info("b");
        let mut b = ShaderCreateInfo::new("b");
        b.additional_info("a");
        registry.register(a);
        registry.register(b);
        let err = registry.finalize("a").expect_err("cycle");
        assert!(matches!(err, CreateInfoError::DuplicateReference { .. }));
    }

    #[test]
    fn stricter_booleans_only_turn_on() {
        let mut registry = CreateInfoRegistry::new();
        let mut early = ShaderCreateInfo::new("early");
        early.early_fragment_test(true);
        registry.register(early);
        let mut info = ShaderCreateInfo::new("top");
        info.early_fragment_test(false).additional_info("early");
        info.finalize(&mut registry).expect("merges");
        assert!(info.has_early_fragment_test());
    }

    #[test]
    #[should_panic(expected = "Overlapping vertex input indices")]
    fn mat4_input_reserves_four_indices() {
        let mut registry = CreateInfoRegistry::new();
        let mut info = ShaderCreateInfo::new("overlap");
        info.vertex_in(0, VarType::Mat4, "model")
            .vertex_in(3, VarType::Vec4, "color");
        let _ = info.finalize(&mut registry);
    }

    #[test]
    fn typedefs_deduplicate_across_merge() {
        let mut registry = CreateInfoRegistry::new();
        let mut shared = ShaderCreateInfo::new("shared");
        shared.typedef_source("common_types");
        registry.register(shared);
        let mut info = ShaderCreateInfo::new("top");
        info.typedef_source("common_types").additional_info("shared");
        info.finalize(&mut registry).expect("merges");
        assert_eq!(info.typedef_sources().len(), 1);
    }
}
