// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Compiled shaders and their name-to-location interface.
//!
//! A [`Shader`] is built from a finalized
//! [`ShaderCreateInfo`](crate::pipeline::create_info::ShaderCreateInfo): stage
//! sources are resolved through the source registry, prefixed with defines and
//! deduplicated typedef sources, and handed to the driver in one compile/link call.
//! On success the shader owns an immutable name → {location, binding} table;
//! on failure the captured diagnostic comes back and nothing half-constructed
//! escapes.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::driver::{Driver, ProgramId, StageSources};
use crate::pipeline::create_info::{
    CreateInfoError, CreateInfoRegistry, ResourceKind, ShaderCreateInfo,
};
use crate::pipeline::sources::{SourceRegistry, UnknownFragment};

/// A named vertex attribute or push constant location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInput {
    pub name: String,
    pub location: u32,
}

/// A named resource binding slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBinding {
    pub name: String,
    pub kind: ResourceKind,
    pub slot: u32,
}

/// The immutable name → location table built at link time.
///
/// Two shaders with identical attribute layouts report the same
/// [`identity`](Self::identity); the attribute-binding cache is keyed by it, not by
/// shader instance.
#[derive(Debug, Clone)]
pub struct ShaderInterface {
    attributes: Vec<ShaderInput>,
    uniforms: Vec<ShaderInput>,
    bindings: Vec<ShaderBinding>,
    identity: u64,
}

impl ShaderInterface {
    fn from_info(info: &ShaderCreateInfo) -> Self {
        let mut attributes: Vec<ShaderInput> = info
            .vertex_inputs()
            .iter()
            .map(|input| ShaderInput {
                name: input.name.clone(),
                location: input.index,
            })
            .collect();
        attributes.sort_by_key(|a| a.location);
        let uniforms = info
            .push_constants()
            .iter()
            .enumerate()
            .map(|(location, constant)| ShaderInput {
                name: constant.name.clone(),
                location: location as u32,
            })
            .collect();
        let bindings = info
            .resources()
            .map(|resource| ShaderBinding {
                name: resource.name.clone(),
                kind: resource.kind,
                slot: resource.slot,
            })
            .collect();
        let mut hasher = std::hash::DefaultHasher::new();
        attributes.len().hash(&mut hasher);
        for attribute in &attributes {
            attribute.location.hash(&mut hasher);
            attribute.name.hash(&mut hasher);
        }
        ShaderInterface {
            attributes,
            uniforms,
            bindings,
            identity: hasher.finish(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&ShaderInput> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform(&self, name: &str) -> Option<&ShaderInput> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn binding(&self, name: &str) -> Option<&ShaderBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn attributes(&self) -> &[ShaderInput] {
        &self.attributes
    }

    /// Interface identity: equal for equal attribute layouts.
    pub fn identity(&self) -> u64 {
        self.identity
    }
}

/// Why a shader could not be built.
#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error(transparent)]
    CreateInfo(#[from] CreateInfoError),
    #[error(transparent)]
    Source(#[from] UnknownFragment),
    #[error("Shader '{name}' must declare either a compute stage or vertex+fragment stages")]
    InvalidStageSet { name: String },
    #[error("Shader '{name}' needs compute support the driver does not report")]
    ComputeUnsupported { name: String },
    #[error("Shader '{name}' failed to link: {log}")]
    Link { name: String, log: String },
}

/// A compiled and linked program with its interface table.  Immutable after a
/// successful link.
#[derive(Debug)]
pub struct Shader {
    name: String,
    program: ProgramId,
    interface: ShaderInterface,
    driver: Arc<dyn Driver>,
}

impl Shader {
    /// Finalizes `name`'s descriptor, assembles its stage sources, and compiles.
    ///
    /// The failing driver call tears down any partially-built stage objects; on
    /// `Err` no program object exists.
    pub fn from_create_info(
        name: &str,
        registry: &mut CreateInfoRegistry,
        sources: &SourceRegistry,
        driver: &Arc<dyn Driver>,
    ) -> Result<Arc<Shader>, ShaderError> {
        registry.finalize(name)?;
        let info = registry
            .get(name)
            .ok_or_else(|| CreateInfoError::UnknownInfo(name.to_string()))?;

        let has_compute = info.compute_source_name().is_some();
        let has_render_stages = info.vertex_source_name().is_some()
            || info.fragment_source_name().is_some()
            || info.geometry_source_name().is_some();
        let has_vertex_fragment =
            info.vertex_source_name().is_some() && info.fragment_source_name().is_some();
        if has_compute && has_render_stages {
            return Err(ShaderError::InvalidStageSet {
                name: name.to_string(),
            });
        }
        if !has_compute && !has_vertex_fragment {
            return Err(ShaderError::InvalidStageSet {
                name: name.to_string(),
            });
        }
        if has_compute && !driver.limits().supports_compute {
            return Err(ShaderError::ComputeUnsupported {
                name: name.to_string(),
            });
        }

        let mut prelude = String::new();
        for (define, value) in info.defines() {
            prelude.push_str(&format!("#define {define} {value}\n"));
        }
        for typedef in info.typedef_sources() {
            prelude.push_str(&sources.resolve(typedef)?);
        }
        let assemble = |fragment: Option<&str>| -> Result<Option<String>, UnknownFragment> {
            match fragment {
                Some(fragment) => Ok(Some(format!("{prelude}{}", sources.resolve(fragment)?))),
                None => Ok(None),
            }
        };
        let stage_sources = StageSources {
            vertex: assemble(info.vertex_source_name())?,
            fragment: assemble(info.fragment_source_name())?,
            geometry: assemble(info.geometry_source_name())?,
            compute: assemble(info.compute_source_name())?,
        };

        let program = driver.program_create(&stage_sources).map_err(|log| {
            logwise::warn_sync!(
                "Shader link failed: {log}",
                log = logwise::privacy::LogIt(&log)
            );
            ShaderError::Link {
                name: name.to_string(),
                log,
            }
        })?;
        let interface = ShaderInterface::from_info(info);
        Ok(Arc::new(Shader {
            name: name.to_string(),
            program,
            interface,
            driver: driver.clone(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interface(&self) -> &ShaderInterface {
        &self.interface
    }

    pub(crate) fn program(&self) -> ProgramId {
        self.program
    }

    /// Sets a push constant by name.  Unknown names log and skip.
    pub fn set_uniform_f32(&self, name: &str, values: &[f32]) {
        match self.interface.uniform(name) {
            Some(uniform) => self
                .driver
                .program_uniform_f32(self.program, uniform.location, values),
            None => logwise::warn_sync!(
                "Unknown uniform {name}",
                name = logwise::privacy::LogIt(name)
            ),
        }
    }

    /// Sets an integer push constant by name.  Unknown names log and skip.
    pub fn set_uniform_i32(&self, name: &str, values: &[i32]) {
        match self.interface.uniform(name) {
            Some(uniform) => self
                .driver
                .program_uniform_i32(self.program, uniform.location, values),
            None => logwise::warn_sync!(
                "Unknown uniform {name}",
                name = logwise::privacy::LogIt(name)
            ),
        }
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // programs are driver-global; immediate deletion is safe from any thread
        self.driver.program_delete(self.program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::trace::TraceDriver;
    use crate::pipeline::create_info::VarType;

    fn registries() -> (CreateInfoRegistry, SourceRegistry) {
        let mut sources = SourceRegistry::new();
        sources.register("plain_vert", "void main() {}\n");
        sources.register("plain_frag", "void main() {}\n");
        (CreateInfoRegistry::new(), sources)
    }

    #[test]
    fn identical_layouts_share_an_identity() {
        let (mut infos, sources) = registries();
        let driver: Arc<dyn Driver> = TraceDriver::new();
        for name in ["one", "two"] {
            let mut info = ShaderCreateInfo::new(name);
            info.vertex_source("plain_vert")
                .fragment_source("plain_frag")
                .vertex_in(0, VarType::Vec3, "pos");
            infos.register(info);
        }
        let one = Shader::from_create_info("one", &mut infos, &sources, &driver).unwrap();
        let two = Shader::from_create_info("two", &mut infos, &sources, &driver).unwrap();
        assert_eq!(one.interface().identity(), two.interface().identity());
    }

    #[test]
    fn link_failure_reports_the_log() {
        let (mut infos, sources) = registries();
        let trace = TraceDriver::new();
        let driver: Arc<dyn Driver> = trace.clone();
        let mut info = ShaderCreateInfo::new("broken");
        info.vertex_source("plain_vert").fragment_source("plain_frag");
        infos.register(info);
        trace.fail_next_compile("0:1: syntax error");
        let err = Shader::from_create_info("broken", &mut infos, &sources, &driver)
            .expect_err("link failure");
        match err {
            ShaderError::Link { log, .. } => assert!(log.contains("syntax error")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn compute_and_render_stages_are_exclusive() {
        let (mut infos, mut sources) = registries();
        sources.register("cs", "void main() {}\n");
        let driver: Arc<dyn Driver> = TraceDriver::new();
        let mut info = ShaderCreateInfo::new("both");
        info.vertex_source("plain_vert")
            .fragment_source("plain_frag")
            .compute_source("cs");
        infos.register(info);
        let err =
            Shader::from_create_info("both", &mut infos, &sources, &driver).expect_err("invalid");
        assert!(matches!(err, ShaderError::InvalidStageSet { .. }));
    }
}
