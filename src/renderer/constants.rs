use super::device::{RawBuffer, ShaderStage};
use super::handle::CpuConstantId;
use super::table::ResourceTable;

/// CPU staging copy of one named shader constant.
#[derive(Debug, Clone)]
pub struct CpuConstant {
    pub name: String,
    pub size: usize,
    pub data: Vec<u8>,
}

/// Registry of every CPU constant of every loaded shader.
///
/// IDs are handed out in load order and only reset together with the shaders
/// that reference them.
#[derive(Default)]
pub struct ConstantRegistry {
    constants: ResourceTable<CpuConstant>,
}

impl ConstantRegistry {
    pub fn register(&mut self, name: &str, size: usize) -> CpuConstantId {
        self.constants.insert(CpuConstant {
            name: name.to_string(),
            size,
            data: vec![0; size],
        })
    }

    pub fn get(&self, id: CpuConstantId) -> &CpuConstant {
        self.constants.get(id)
    }

    /// Copies `bytes` into the staging memory unless it already holds them.
    /// Returns whether anything changed.
    ///
    /// Input longer than the constant is truncated; shorter input is a caller
    /// bug.
    pub fn write(&mut self, id: CpuConstantId, bytes: &[u8]) -> bool {
        let constant = self.constants.get_mut(id);
        debug_assert!(
            bytes.len() >= constant.size,
            "constant {} needs {} bytes, got {}",
            constant.name,
            constant.size,
            bytes.len()
        );
        let len = constant.size.min(bytes.len());
        if constant.data[..len] == bytes[..len] {
            return false;
        }
        constant.data[..len].copy_from_slice(&bytes[..len]);
        true
    }

    /// Drops every constant; the next registration gets ID 0 again.
    pub fn reset(&mut self) {
        self.constants.drain();
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

/// Where one CPU constant lands inside its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedConstant {
    pub constant: CpuConstantId,
    pub offset: u32,
}

/// GPU constant buffer of a shader, bound at `slot` of `stage`.
#[derive(Debug)]
pub struct ConstantBuffer {
    pub name: String,
    pub buffer: RawBuffer,
    pub stage: ShaderStage,
    pub slot: u32,
    pub size: u32,
    pub dirty: bool,
    pub fields: Vec<PackedConstant>,
}

impl ConstantBuffer {
    /// Builds the upload image from the staging copies.
    pub fn assemble(&self, registry: &ConstantRegistry) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size as usize];
        for field in &self.fields {
            let constant = registry.get(field.constant);
            let start = field.offset as usize;
            let end = (start + constant.size).min(bytes.len());
            bytes[start..end].copy_from_slice(&constant.data[..end - start]);
        }
        bytes
    }
}

const BUFFER_ALIGNMENT: u32 = 16;

fn align_up(value: u32, alignment: u32) -> Option<u32> {
    value.checked_next_multiple_of(alignment)
}

fn field_alignment(size: u32) -> u32 {
    match size {
        0..=4 => 4,
        5..=8 => 8,
        _ => 16,
    }
}

/// Lays out fields of the given `(size, explicit offset)` in declaration
/// order. Returns each field's offset and the buffer size, or `None` when a
/// field would end past `u32::MAX`.
pub fn pack_layout<I>(fields: I) -> Option<(Vec<u32>, u32)>
where
    I: IntoIterator<Item = (u32, Option<u32>)>,
{
    let mut cursor = 0u32;
    let mut end = 0u32;
    let mut offsets = Vec::new();
    for (size, explicit) in fields {
        let offset = match explicit {
            Some(offset) => offset,
            None => align_up(cursor, field_alignment(size))?,
        };
        cursor = offset.checked_add(size)?;
        end = end.max(cursor);
        offsets.push(offset);
    }
    Some((offsets, align_up(end.max(1), BUFFER_ALIGNMENT)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_vec3_followed_by_scalar_into_one_row() {
        let (offsets, size) = pack_layout([(12, None), (4, None)]).unwrap();
        assert_eq!(offsets, vec![0, 12]);
        assert_eq!(size, 16);
    }

    #[test]
    fn matrices_and_vectors_align_to_sixteen() {
        let (offsets, size) = pack_layout([(4, None), (64, None), (8, None), (12, None)]).unwrap();
        assert_eq!(offsets, vec![0, 16, 80, 96]);
        assert_eq!(size, 112);
    }

    #[test]
    fn explicit_offsets_win() {
        let (offsets, size) = pack_layout([(4, Some(32)), (4, None)]).unwrap();
        assert_eq!(offsets, vec![32, 36]);
        assert_eq!(size, 48);
    }

    #[test]
    fn field_ending_past_u32_max_is_rejected() {
        assert!(pack_layout([(16, Some(u32::MAX - 4))]).is_none());
        assert!(pack_layout([(4, Some(u32::MAX - 2)), (16, None)]).is_none());
        assert!(pack_layout([(4, Some(u32::MAX - 4))]).is_some());
    }

    #[test]
    fn identical_write_reports_no_change() {
        let mut registry = ConstantRegistry::default();
        let id = registry.register("value", 4);
        assert!(registry.write(id, &1.0f32.to_ne_bytes()));
        assert!(!registry.write(id, &1.0f32.to_ne_bytes()));
        assert!(registry.write(id, &2.0f32.to_ne_bytes()));
    }

    #[test]
    fn longer_input_is_truncated() {
        let mut registry = ConstantRegistry::default();
        let id = registry.register("value", 2);
        registry.write(id, &[7, 8, 9, 10]);
        assert_eq!(registry.get(id).data, vec![7, 8]);
    }

    #[test]
    fn reset_restarts_ids_at_zero() {
        let mut registry = ConstantRegistry::default();
        registry.register("a", 4);
        registry.register("b", 4);
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.register("c", 4).raw(), 0);
    }

    #[test]
    fn assemble_places_fields_at_offsets() {
        let mut registry = ConstantRegistry::default();
        let a = registry.register("a", 4);
        let b = registry.register("b", 4);
        registry.write(a, &[1, 1, 1, 1]);
        registry.write(b, &[2, 2, 2, 2]);
        let buffer = ConstantBuffer {
            name: "Params".into(),
            buffer: RawBuffer(1),
            stage: ShaderStage::Pixel,
            slot: 0,
            size: 16,
            dirty: false,
            fields: vec![
                PackedConstant {
                    constant: a,
                    offset: 0,
                },
                PackedConstant {
                    constant: b,
                    offset: 8,
                },
            ],
        };
        assert_eq!(
            buffer.assemble(&registry),
            vec![1, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2, 0, 0, 0, 0]
        );
    }
}
