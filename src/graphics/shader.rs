// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! # Shader Program Cache
//!
//! Shaders arrive already compiled for the backend by an external tool,
//! together with their reflection data (vertex inputs and sampler slots).
//! A vertex and a pixel shader are linked lazily the first time they are
//! drawn with together. The linked program is cached under the pair of
//! shader hash keys and lives until teardown or device reset.

use crate::backend::{GraphicsBackend, ProgramHandle, ShaderHandle};
use crate::error::{GfxError, GfxResult};
use crate::graphics::resource::ResourceId;
use crate::graphics::types::ShaderStage;
use crate::graphics::vertex::VertexElementUsage;
use log::{debug, error};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Code representation a shader blob is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderProfile {
    Glsl,
    Wgsl,
}

/// Vertex input of a vertex shader as reported by the shader compiler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderAttribute {
    pub name: String,
    pub usage: VertexElementUsage,
    pub index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSampler {
    pub name: String,
    pub slot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderDesc {
    pub stage: ShaderStage,
    pub profile: ShaderProfile,
    pub code: Vec<u8>,
    pub entry_point: String,
    pub attributes: Vec<ShaderAttribute>,
    pub samplers: Vec<ShaderSampler>,
}

impl ShaderDesc {
    pub fn new(stage: ShaderStage, profile: ShaderProfile, code: impl Into<Vec<u8>>) -> Self {
        Self {
            stage,
            profile,
            code: code.into(),
            entry_point: String::from("main"),
            attributes: vec![],
            samplers: vec![],
        }
    }

    pub fn with_attribute(mut self, name: &str, usage: VertexElementUsage, index: u8) -> Self {
        self.attributes.push(ShaderAttribute {
            name: name.to_string(),
            usage,
            index,
        });
        self
    }

    pub fn with_sampler(mut self, name: &str, slot: u32) -> Self {
        self.samplers.push(ShaderSampler {
            name: name.to_string(),
            slot,
        });
        self
    }

    pub fn hash_key(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.stage.hash(&mut h);
        self.code.hash(&mut h);
        self.entry_point.hash(&mut h);
        h.finish()
    }
}

#[derive(Debug)]
pub struct Shader {
    pub(crate) id: ResourceId,
    pub(crate) stage: ShaderStage,
    pub(crate) handle: ShaderHandle,
    pub(crate) hash_key: u64,
    pub(crate) entry_point: String,
    pub(crate) attributes: Vec<ShaderAttribute>,
    pub(crate) samplers: Vec<ShaderSampler>,
}

impl Shader {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn handle(&self) -> ShaderHandle {
        self.handle
    }

    pub fn hash_key(&self) -> u64 {
        self.hash_key
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn attributes(&self) -> &[ShaderAttribute] {
        &self.attributes
    }

    pub fn samplers(&self) -> &[ShaderSampler] {
        &self.samplers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub vertex: u64,
    pub pixel: u64,
}

impl ProgramKey {
    pub fn new(vertex: &Shader, pixel: &Shader) -> Self {
        Self {
            vertex: vertex.hash_key,
            pixel: pixel.hash_key,
        }
    }

    pub fn references(&self, hash_key: u64) -> bool {
        self.vertex == hash_key || self.pixel == hash_key
    }
}

#[derive(Debug)]
pub struct ShaderProgram {
    key: ProgramKey,
    handle: ProgramHandle,
    /// `(usage, usage index, location)` of every active vertex input.
    attributes: Vec<(VertexElementUsage, u8, u32)>,
}

impl ShaderProgram {
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn attribute_location(&self, usage: VertexElementUsage, index: u8) -> Option<u32> {
        self.attributes
            .iter()
            .find(|(u, i, _)| *u == usage && *i == index)
            .map(|(_, _, loc)| *loc)
    }
}

#[derive(Default)]
pub struct ShaderProgramCache {
    programs: HashMap<ProgramKey, Arc<ShaderProgram>>,
}

impl ShaderProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached program of the pair, linked on first use.
    pub fn get_program(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        vertex: &Shader,
        pixel: &Shader,
    ) -> GfxResult<Arc<ShaderProgram>> {
        let key = ProgramKey::new(vertex, pixel);
        if let Some(p) = self.programs.get(&key) {
            return Ok(p.clone());
        }

        let handle = backend.link_program(vertex, pixel).map_err(|log| {
            error!("link {:?} + {:?} failed: {}", vertex.id, pixel.id, log);
            GfxError::ShaderLink(log)
        })?;
        let attributes = vertex
            .attributes
            .iter()
            .filter_map(|a| {
                backend
                    .attribute_location(handle, &a.name)
                    .map(|loc| (a.usage, a.index, loc))
            })
            .collect();
        debug!("program cache miss {:?} -> {:?}", key, handle);
        let program = Arc::new(ShaderProgram {
            key,
            handle,
            attributes,
        });
        self.programs.insert(key, program.clone());
        Ok(program)
    }

    /// Drop programs linked from the shader with `hash_key`.
    pub fn purge_shader(&mut self, backend: &mut dyn GraphicsBackend, hash_key: u64) {
        self.programs.retain(|key, p| {
            let keep = !key.references(hash_key);
            if !keep {
                backend.destroy_program(p.handle);
            }
            keep
        });
    }

    pub fn clear(&mut self, backend: &mut dyn GraphicsBackend) {
        for (_, p) in self.programs.drain() {
            backend.destroy_program(p.handle);
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key_follows_code() {
        let a = ShaderDesc::new(ShaderStage::Vertex, ShaderProfile::Glsl, "void main(){}");
        let b = ShaderDesc::new(ShaderStage::Vertex, ShaderProfile::Glsl, "void main(){}");
        let c = ShaderDesc::new(ShaderStage::Pixel, ShaderProfile::Glsl, "void main(){}");
        assert_eq!(a.hash_key(), b.hash_key());
        assert_ne!(a.hash_key(), c.hash_key());
    }

    #[test]
    fn test_program_key_is_ordered() {
        let k1 = ProgramKey { vertex: 1, pixel: 2 };
        let k2 = ProgramKey { vertex: 2, pixel: 1 };
        assert_ne!(k1, k2);
        assert!(k1.references(2));
        assert!(!k1.references(3));
    }
}
