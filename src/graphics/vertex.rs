// RustPixel
// copyright zipxing@hotmail.com 2022～2025

//! Vertex layouts and vertex buffer bindings.
//!
//! A [`VertexDeclaration`] describes how one vertex is laid out in memory.
//! Combined with a linked program it yields an [`AttributeInfo`]: the list of
//! attribute pointers that program needs, which is what the attribute
//! resolver compares and pushes.

use crate::backend::AttribType;
use crate::error::{GfxError, GfxResult};
use crate::graphics::resource::{ResourceId, VertexBuffer};
use crate::graphics::shader::ShaderProgram;
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementFormat {
    Single,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Byte4,
    Short2,
    Short4,
    NormalizedShort2,
    NormalizedShort4,
    HalfVector2,
    HalfVector4,
}

impl VertexElementFormat {
    pub fn size(&self) -> u32 {
        let (components, ty, _) = self.attrib();
        components * ty.size() as u32
    }

    /// `(components, component type, normalized)` as the shader reads it.
    pub fn attrib(&self) -> (u32, AttribType, bool) {
        use VertexElementFormat::*;
        match self {
            Single => (1, AttribType::F32, false),
            Vector2 => (2, AttribType::F32, false),
            Vector3 => (3, AttribType::F32, false),
            Vector4 => (4, AttribType::F32, false),
            Color => (4, AttribType::U8, true),
            Byte4 => (4, AttribType::U8, false),
            Short2 => (2, AttribType::I16, false),
            Short4 => (4, AttribType::I16, false),
            NormalizedShort2 => (2, AttribType::I16, true),
            NormalizedShort4 => (4, AttribType::I16, true),
            HalfVector2 => (2, AttribType::F16, false),
            HalfVector4 => (4, AttribType::F16, false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexElementUsage {
    Position,
    Color,
    TextureCoordinate,
    Normal,
    Binormal,
    Tangent,
    BlendIndices,
    BlendWeight,
    Depth,
    Fog,
    PointSize,
    Sample,
    TessellateFactor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexElement {
    pub offset: u32,
    pub format: VertexElementFormat,
    pub usage: VertexElementUsage,
    pub usage_index: u8,
}

impl VertexElement {
    pub const fn new(
        offset: u32,
        format: VertexElementFormat,
        usage: VertexElementUsage,
        usage_index: u8,
    ) -> Self {
        Self {
            offset,
            format,
            usage,
            usage_index,
        }
    }
}

#[derive(Debug)]
pub struct VertexDeclaration {
    id: ResourceId,
    stride: u32,
    elements: Vec<VertexElement>,
}

impl VertexDeclaration {
    /// Stride is the end of the furthest element.
    pub fn new(elements: Vec<VertexElement>) -> Arc<Self> {
        let stride = elements
            .iter()
            .map(|e| e.offset + e.format.size())
            .max()
            .unwrap_or(0);
        Arc::new(Self {
            id: ResourceId::next(),
            stride,
            elements,
        })
    }

    pub fn with_stride(stride: u32, elements: Vec<VertexElement>) -> GfxResult<Arc<Self>> {
        if let Some(e) = elements.iter().find(|e| e.offset + e.format.size() > stride) {
            return Err(GfxError::out_of_range(
                "stride",
                format!("element {:?}@{} does not fit in stride {}", e.usage, e.offset, stride),
            ));
        }
        Ok(Arc::new(Self {
            id: ResourceId::next(),
            stride,
            elements,
        }))
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.elements
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeElement {
    pub location: u32,
    pub components: u32,
    pub ty: AttribType,
    pub normalized: bool,
    pub offset: u32,
}

/// Attribute pointers of one declaration as seen by one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub stride: u32,
    pub elements: SmallVec<[AttributeElement; 8]>,
}

impl AttributeInfo {
    /// Match declaration elements to program attributes by usage and usage
    /// index. Elements the program doesn't read are left out.
    pub fn build(declaration: &VertexDeclaration, program: &ShaderProgram) -> AttributeInfo {
        let elements = declaration
            .elements()
            .iter()
            .filter_map(|e| {
                let location = program.attribute_location(e.usage, e.usage_index)?;
                let (components, ty, normalized) = e.format.attrib();
                Some(AttributeElement {
                    location,
                    components,
                    ty,
                    normalized,
                    offset: e.offset,
                })
            })
            .collect();
        AttributeInfo {
            stride: declaration.stride(),
            elements,
        }
    }
}

/// A vertex buffer bound to one slot.
#[derive(Debug, Clone)]
pub struct VertexBufferBinding {
    pub buffer: Arc<VertexBuffer>,
    /// First vertex the slot starts at.
    pub vertex_offset: usize,
    /// 0 for per-vertex data, n to advance once every n instances.
    pub instance_frequency: u32,
}

impl VertexBufferBinding {
    pub fn new(buffer: Arc<VertexBuffer>) -> Self {
        Self {
            buffer,
            vertex_offset: 0,
            instance_frequency: 0,
        }
    }

    pub fn instanced(buffer: Arc<VertexBuffer>, instance_frequency: u32) -> Self {
        Self {
            buffer,
            vertex_offset: 0,
            instance_frequency,
        }
    }
}

impl PartialEq for VertexBufferBinding {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
            && self.vertex_offset == other.vertex_offset
            && self.instance_frequency == other.instance_frequency
    }
}

/// Vertex buffer slots of a context.
#[derive(Debug)]
pub struct VertexBufferBindings {
    slots: Vec<VertexBufferBinding>,
    max_slots: usize,
}

impl VertexBufferBindings {
    pub fn new(max_slots: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_slots),
            max_slots,
        }
    }

    /// Replace all slots, returns true when anything changed.
    pub fn set(&mut self, bindings: &[VertexBufferBinding]) -> GfxResult<bool> {
        if bindings.len() > self.max_slots {
            return Err(GfxError::out_of_range(
                "vertex_buffers",
                format!(
                    "{} vertex buffers bound, at most {} slots available",
                    bindings.len(),
                    self.max_slots
                ),
            ));
        }
        if let Some(b) = bindings.iter().find(|b| b.buffer.is_disposed()) {
            return Err(GfxError::invalid(format!(
                "vertex buffer {:?} is disposed",
                b.buffer.id()
            )));
        }
        if self.slots.as_slice() == bindings {
            return Ok(false);
        }
        self.slots.clear();
        self.slots.extend_from_slice(bindings);
        Ok(true)
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.slots.is_empty();
        self.slots.clear();
        changed
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, slot: usize) -> Option<&VertexBufferBinding> {
        self.slots.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VertexBufferBinding> {
        self.slots.iter()
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.slots.iter().any(|b| b.buffer.id() == id)
    }

    /// Drop the trailing slots holding `id`. Fails, leaving every slot in
    /// place, when `id` sits below a slot holding another buffer.
    pub(crate) fn unbind(&mut self, id: ResourceId) -> GfxResult<bool> {
        let keep = self
            .slots
            .iter()
            .rposition(|b| b.buffer.id() != id)
            .map_or(0, |last| last + 1);
        if let Some(slot) = self.slots[..keep].iter().position(|b| b.buffer.id() == id) {
            return Err(GfxError::invalid(format!(
                "vertex buffer {:?} is bound in slot {} below live slots",
                id, slot
            )));
        }
        let changed = keep < self.slots.len();
        self.slots.truncate(keep);
        Ok(changed)
    }

    pub(crate) fn set_max_slots(&mut self, max_slots: usize) {
        self.max_slots = max_slots;
        self.slots.truncate(max_slots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VertexElementFormat as F;
    use VertexElementUsage as U;

    #[test]
    fn test_declaration_stride() {
        let decl = VertexDeclaration::new(vec![
            VertexElement::new(0, F::Vector3, U::Position, 0),
            VertexElement::new(12, F::Color, U::Color, 0),
            VertexElement::new(16, F::Vector2, U::TextureCoordinate, 0),
        ]);
        assert_eq!(decl.stride(), 24);
        assert!(VertexDeclaration::with_stride(32, decl.elements().to_vec()).is_ok());
        assert!(matches!(
            VertexDeclaration::with_stride(20, decl.elements().to_vec()),
            Err(GfxError::ArgumentOutOfRange { .. })
        ));
    }

    #[test]
    fn test_format_sizes() {
        assert_eq!(F::Color.size(), 4);
        assert_eq!(F::Vector4.size(), 16);
        assert_eq!(F::HalfVector4.size(), 8);
        assert_eq!(F::NormalizedShort2.attrib(), (2, AttribType::I16, true));
    }
}
