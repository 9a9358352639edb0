use std::collections::BTreeMap;

use bytemuck::{Pod, Zeroable};

use crate::types::MAX_PALETTE_COLORS;

/// Host-side mirror of the `BackdropParams` block shared by both effects.
///
/// Uploads go through [`UniformBlock`], which addresses bytes by the offsets
/// reflected from the compiled fragment stage; this struct exists so a frame's
/// uniform bytes can be decoded again (see [`crate::headless::DrawRecord`]).
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub layer_count: f32,
    pub inner_radius: f32,
    pub outer_radius: f32,
    pub zoom_speed: f32,
    pub palette_len: f32,
    pub intensity: f32,
    pub drift_speed: f32,
    pub seed: f32,
    pub _pad0: f32,
    pub palette: [[f32; 4]; MAX_PALETTE_COLORS],
}

unsafe impl Zeroable for FrameUniforms {}
unsafe impl Pod for FrameUniforms {}

impl FrameUniforms {
    /// Decodes the leading bytes of an uploaded uniform buffer.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let size = std::mem::size_of::<Self>();
        if bytes.len() < size {
            return None;
        }
        Some(bytemuck::pod_read_unaligned(&bytes[..size]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    /// `vec4` array with the given element count.
    Vec4Array(u32),
}

/// Reflected location of one uniform inside the block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: u32,
    /// Array stride; zero for non-array members.
    pub stride: u32,
    pub kind: UniformKind,
}

/// Uniform locations resolved once at build time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UniformLayout {
    block: String,
    size: u32,
    slots: BTreeMap<String, UniformSlot>,
}

impl UniformLayout {
    pub fn new(block: impl Into<String>, size: u32) -> Self {
        Self {
            block: block.into(),
            size,
            slots: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, slot: UniformSlot) {
        self.slots.insert(name.into(), slot);
    }

    pub fn block_name(&self) -> &str {
        &self.block
    }

    /// Size of the block in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn slot(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, UniformSlot)> {
        self.slots.iter().map(|(name, slot)| (name.as_str(), *slot))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformRole {
    Time,
    Resolution,
    Custom,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec4Array(Vec<[f32; 4]>),
}

impl UniformValue {
    fn fits(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (UniformValue::Float(_), UniformKind::Float)
                | (UniformValue::Vec2(_), UniformKind::Vec2)
                | (UniformValue::Vec4Array(_), UniformKind::Vec4Array(_))
        )
    }
}

/// A named value pushed to the program each frame.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformBinding {
    pub name: &'static str,
    pub role: UniformRole,
    pub value: UniformValue,
}

impl UniformBinding {
    pub fn new(name: &'static str, role: UniformRole, value: UniformValue) -> Self {
        Self { name, role, value }
    }
}

#[derive(Debug, Clone)]
struct BoundUniform {
    binding: UniformBinding,
    slot: UniformSlot,
}

/// CPU image of the uniform buffer, written through cached slots.
#[derive(Debug, Clone)]
pub struct UniformBlock {
    bytes: Vec<u8>,
    bound: Vec<BoundUniform>,
    dirty: bool,
}

impl UniformBlock {
    pub fn new(layout: &UniformLayout, bindings: Vec<UniformBinding>) -> Self {
        let mut block = Self {
            bytes: vec![0; layout.size() as usize],
            bound: Vec::with_capacity(bindings.len()),
            dirty: true,
        };
        for binding in bindings {
            match layout.slot(binding.name) {
                Some(slot) if binding.value.fits(slot.kind) => {
                    write_value(&mut block.bytes, slot, &binding.value);
                    block.bound.push(BoundUniform { binding, slot });
                }
                Some(slot) => tracing::warn!(
                    uniform = binding.name,
                    kind = ?slot.kind,
                    "uniform value does not match declared shape; ignoring"
                ),
                None => tracing::warn!(
                    uniform = binding.name,
                    "program does not declare uniform; ignoring"
                ),
            }
        }
        block
    }

    /// Updates the first binding with `role`. Returns false if none is bound.
    pub fn set_role(&mut self, role: UniformRole, value: UniformValue) -> bool {
        let Some(entry) = self.bound.iter_mut().find(|entry| entry.binding.role == role) else {
            return false;
        };
        if !value.fits(entry.slot.kind) {
            return false;
        }
        if entry.binding.value != value {
            write_value(&mut self.bytes, entry.slot, &value);
            entry.binding.value = value;
            self.dirty = true;
        }
        true
    }

    pub fn set_time(&mut self, seconds: f32) -> bool {
        self.set_role(UniformRole::Time, UniformValue::Float(seconds))
    }

    pub fn set_resolution(&mut self, width: f32, height: f32) -> bool {
        self.set_role(UniformRole::Resolution, UniformValue::Vec2([width, height]))
    }

    pub fn binding(&self, name: &str) -> Option<&UniformBinding> {
        self.bound
            .iter()
            .map(|entry| &entry.binding)
            .find(|binding| binding.name == name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns whether the bytes changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

fn write_value(bytes: &mut [u8], slot: UniformSlot, value: &UniformValue) {
    let offset = slot.offset as usize;
    match (value, slot.kind) {
        (UniformValue::Float(v), _) => put(bytes, offset, bytemuck::bytes_of(v)),
        (UniformValue::Vec2(v), _) => put(bytes, offset, bytemuck::cast_slice(v)),
        (UniformValue::Vec4Array(values), UniformKind::Vec4Array(len)) => {
            let stride = slot.stride.max(16) as usize;
            for (index, value) in values.iter().take(len as usize).enumerate() {
                put(bytes, offset + index * stride, bytemuck::cast_slice(value));
            }
        }
        (UniformValue::Vec4Array(_), _) => {}
    }
}

fn put(bytes: &mut [u8], offset: usize, data: &[u8]) {
    if let Some(target) = bytes.get_mut(offset..offset + data.len()) {
        target.copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, offset_of, size_of};

    #[test]
    fn frame_uniforms_follow_std140_layout() {
        assert_eq!(align_of::<FrameUniforms>(), 16);
        assert_eq!(size_of::<FrameUniforms>(), 128);
        assert_eq!(offset_of!(FrameUniforms, resolution), 0);
        assert_eq!(offset_of!(FrameUniforms, time), 8);
        assert_eq!(offset_of!(FrameUniforms, inner_radius), 16);
        assert_eq!(offset_of!(FrameUniforms, intensity), 32);
        assert_eq!(offset_of!(FrameUniforms, seed), 40);
        assert_eq!(offset_of!(FrameUniforms, palette), 48);
    }

    fn layout() -> UniformLayout {
        let mut layout = UniformLayout::new("BackdropParams", 128);
        layout.insert(
            "resolution",
            UniformSlot {
                offset: 0,
                stride: 0,
                kind: UniformKind::Vec2,
            },
        );
        layout.insert(
            "time",
            UniformSlot {
                offset: 8,
                stride: 0,
                kind: UniformKind::Float,
            },
        );
        layout.insert(
            "palette",
            UniformSlot {
                offset: 48,
                stride: 16,
                kind: UniformKind::Vec4Array(5),
            },
        );
        layout
    }

    #[test]
    fn writes_through_cached_slots() {
        let mut block = UniformBlock::new(
            &layout(),
            vec![
                UniformBinding::new("time", UniformRole::Time, UniformValue::Float(0.0)),
                UniformBinding::new(
                    "resolution",
                    UniformRole::Resolution,
                    UniformValue::Vec2([0.0, 0.0]),
                ),
                UniformBinding::new(
                    "palette",
                    UniformRole::Custom,
                    UniformValue::Vec4Array(vec![[1.0, 0.5, 0.25, 1.0], [0.0, 1.0, 0.0, 1.0]]),
                ),
            ],
        );
        assert!(block.take_dirty());
        assert!(block.set_time(1.5));
        assert!(block.set_resolution(800.0, 600.0));
        assert!(block.take_dirty());

        let decoded = FrameUniforms::from_bytes(block.bytes()).unwrap();
        assert_eq!(decoded.time, 1.5);
        assert_eq!(decoded.resolution, [800.0, 600.0]);
        assert_eq!(decoded.palette[0], [1.0, 0.5, 0.25, 1.0]);
        assert_eq!(decoded.palette[1], [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(decoded.palette[2], [0.0; 4]);
    }

    #[test]
    fn unchanged_value_is_not_dirty() {
        let mut block = UniformBlock::new(
            &layout(),
            vec![UniformBinding::new(
                "time",
                UniformRole::Time,
                UniformValue::Float(2.0),
            )],
        );
        block.take_dirty();
        assert!(block.set_time(2.0));
        assert!(!block.take_dirty());
    }

    #[test]
    fn unknown_or_mismatched_bindings_are_skipped() {
        let mut block = UniformBlock::new(
            &layout(),
            vec![
                UniformBinding::new("missing", UniformRole::Custom, UniformValue::Float(1.0)),
                UniformBinding::new("time", UniformRole::Time, UniformValue::Vec2([1.0, 2.0])),
            ],
        );
        assert!(block.binding("missing").is_none());
        assert!(!block.set_time(1.0));
    }
}
