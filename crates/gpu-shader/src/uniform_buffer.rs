//! Growable CPU arena of uniform block instances ("slots").
//!
//! A [`UniformBlockBuffer`] holds every instance of one block pushed during a frame. Each push
//! seeds the new slot with the previous slot's bytes, so callers only write what changed; with
//! deduplication an unchanged slot is rolled back and the previous one is reused. Committed
//! slots are sent to the GPU with [`UniformBlockBuffer::upload`].

use std::sync::Arc;

use thiserror::Error;

use crate::math::{Mat4, INDICES_BY_COLUMNS_4X4};
use crate::types::VarType;
use crate::ir::ArrayLen;
use crate::uniform_block::{BlockId, TypedUniform, UniformBlock, UniformField};
use crate::upload::UploadTarget;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniformBufferError {
    #[error("uniform buffer capacity overflow growing to slot {index} (block size {block_size})")]
    CapacityOverflow { index: usize, block_size: usize },
    #[error("uniform slot reference from generation {held} used after the buffer grew (generation {current})")]
    StaleRef { held: u64, current: u64 },
    #[error("uniform slot {index} is not committed (buffer holds {len} slots)")]
    OutOfRange { index: usize, len: usize },
    #[error("uniform slot reference for block {found:?} used with a buffer of block {expected:?}")]
    WrongBlock { expected: BlockId, found: BlockId },
    #[error("uniform buffer of block `{block}` has no committed slot")]
    Empty { block: String },
}

/// Element type and per-element stride of the field being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldShape {
    pub ty: VarType,
    pub stride: usize,
    /// Declared element count of a fixed-size array. `None` for plain and unbounded fields.
    pub count: Option<usize>,
}

impl From<&UniformField> for FieldShape {
    fn from(field: &UniformField) -> Self {
        Self {
            ty: field.uniform.ty,
            stride: field.size,
            count: match field.uniform.array {
                Some(ArrayLen::Fixed(n)) => Some(n),
                Some(ArrayLen::Unbounded) | None => None,
            },
        }
    }
}

/// Value that can be stored into a uniform field. `dst` starts at the field offset and runs to
/// the end of the slot.
pub trait UniformValue {
    fn write_to(&self, shape: FieldShape, dst: &mut [u8]);
}

/// Value that can be loaded back from a uniform field.
pub trait UniformRead: Sized {
    fn read_from(shape: FieldShape, src: &[u8]) -> Self;
}

fn put(dst: &mut [u8], at: usize, bytes: &[u8]) {
    let end = at + bytes.len();
    debug_assert!(end <= dst.len(), "uniform write past the end of the slot");
    if let Some(dst) = dst.get_mut(at..end) {
        dst.copy_from_slice(bytes);
    }
}

fn take<T: bytemuck::Pod>(src: &[u8], at: usize) -> T {
    let end = at + std::mem::size_of::<T>();
    debug_assert!(end <= src.len(), "uniform read past the end of the slot");
    src.get(at..end)
        .map(bytemuck::pod_read_unaligned)
        .unwrap_or_else(bytemuck::Zeroable::zeroed)
}

macro_rules! pod_uniform {
    ($($ty:ty),* $(,)?) => {
        $(
            impl UniformValue for $ty {
                fn write_to(&self, _shape: FieldShape, dst: &mut [u8]) {
                    put(dst, 0, bytemuck::bytes_of(self));
                }
            }

            impl UniformRead for $ty {
                fn read_from(_shape: FieldShape, src: &[u8]) -> Self {
                    take(src, 0)
                }
            }
        )*
    };
}

pod_uniform!(i32, f32, [i32; 2], [f32; 2], [i32; 3], [f32; 3], [i32; 4], [f32; 4]);

/// Stored as 1.0/0.0 in a float field.
impl UniformValue for bool {
    fn write_to(&self, shape: FieldShape, dst: &mut [u8]) {
        let value: f32 = if *self { 1.0 } else { 0.0 };
        value.write_to(shape, dst);
    }
}

fn matrix_cells(ty: VarType) -> usize {
    match ty {
        VarType::Mat3 => 12,
        _ => 16,
    }
}

impl UniformValue for Mat4 {
    fn write_to(&self, shape: FieldShape, dst: &mut [u8]) {
        debug_assert!(shape.ty.is_matrix(), "matrix written to {:?} field", shape.ty);
        let cells = matrix_cells(shape.ty);
        for (n, &index) in INDICES_BY_COLUMNS_4X4.iter().take(cells).enumerate() {
            put(dst, n * 4, bytemuck::bytes_of(&self.get_at_index(index)));
        }
    }
}

impl UniformRead for Mat4 {
    fn read_from(shape: FieldShape, src: &[u8]) -> Self {
        let mut m = Mat4::IDENTITY;
        let cells = matrix_cells(shape.ty);
        for (n, &index) in INDICES_BY_COLUMNS_4X4.iter().take(cells).enumerate() {
            m.set_at_index(index, take(src, n * 4));
        }
        m
    }
}

impl<T: UniformValue> UniformValue for [T] {
    fn write_to(&self, shape: FieldShape, dst: &mut [u8]) {
        let count = shape.count.unwrap_or(self.len());
        if self.len() > count {
            tracing::warn!(
                ty = ?shape.ty,
                declared = count,
                given = self.len(),
                "uniform array value longer than its field; extra elements dropped"
            );
        }
        for (n, value) in self.iter().take(count).enumerate() {
            let at = n * shape.stride;
            match dst.get_mut(at..) {
                Some(dst) => value.write_to(shape, dst),
                None => {
                    debug_assert!(false, "uniform array write past the end of the slot");
                    break;
                }
            }
        }
    }
}

impl<T: UniformValue> UniformValue for Vec<T> {
    fn write_to(&self, shape: FieldShape, dst: &mut [u8]) {
        self.as_slice().write_to(shape, dst);
    }
}

fn field_bytes<'b>(block: &UniformBlock, slot: &'b [u8], field: &UniformField) -> &'b [u8] {
    debug_assert_eq!(field.uniform.block, block.id(), "field of another uniform block");
    slot.get(field.uniform.offset..).unwrap_or_default()
}

/// Mutable view of one slot.
pub struct Uniforms<'a> {
    block: &'a UniformBlock,
    index: usize,
    bytes: &'a mut [u8],
}

impl<'a> Uniforms<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn block(&self) -> &UniformBlock {
        self.block
    }

    pub fn bytes(&self) -> &[u8] {
        &*self.bytes
    }

    pub fn set<T: UniformValue + ?Sized>(&mut self, uniform: &TypedUniform<T>, value: &T) {
        let field = uniform.field();
        debug_assert_eq!(field.uniform.block, self.block.id(), "field of another uniform block");
        if let Some(dst) = self.bytes.get_mut(field.uniform.offset..) {
            value.write_to(FieldShape::from(field), dst);
        }
    }

    pub fn get<T: UniformRead>(&self, uniform: &TypedUniform<T>) -> T {
        let field = uniform.field();
        T::read_from(FieldShape::from(field), field_bytes(self.block, &*self.bytes, field))
    }

    /// Overwrite this slot with the current slot of `other`.
    pub fn copy_from(&mut self, other: &UniformBlockBuffer) -> Result<(), UniformBufferError> {
        // Ids are only unique within one registry, so compare the layouts themselves.
        let same_block = std::ptr::eq(other.block.as_ref(), self.block) || *other.block == *self.block;
        if !same_block {
            return Err(UniformBufferError::WrongBlock {
                expected: self.block.id(),
                found: other.block.id(),
            });
        }
        let index = other.current.ok_or_else(|| UniformBufferError::Empty {
            block: other.block.name().to_owned(),
        })?;
        self.bytes.copy_from_slice(other.slot(index));
        Ok(())
    }
}

/// Read-only view of one committed slot.
pub struct UniformsView<'a> {
    block: &'a UniformBlock,
    index: usize,
    bytes: &'a [u8],
}

impl UniformsView<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn get<T: UniformRead>(&self, uniform: &TypedUniform<T>) -> T {
        let field = uniform.field();
        T::read_from(FieldShape::from(field), field_bytes(self.block, self.bytes, field))
    }
}

/// Detached handle to a slot. Valid until the buffer grows or the slot is popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformsRef {
    pub block: BlockId,
    pub index: usize,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct UniformBlockBuffer {
    block: Arc<UniformBlock>,
    block_size: usize,
    data: Vec<u8>,
    current: Option<usize>,
    generation: u64,
}

impl UniformBlockBuffer {
    /// Empty buffer with room for one slot.
    pub fn new(block: Arc<UniformBlock>) -> Self {
        let block_size = block.total_size();
        Self {
            block,
            block_size,
            data: vec![0; block_size],
            current: None,
            generation: 0,
        }
    }

    /// Buffer holding exactly one slot written by `writer`.
    pub fn single(
        block: Arc<UniformBlock>,
        writer: impl FnOnce(&mut Uniforms<'_>),
    ) -> Result<Self, UniformBufferError> {
        let mut buffer = Self::new(block);
        buffer.push(false, writer)?;
        Ok(buffer)
    }

    pub fn block(&self) -> &Arc<UniformBlock> {
        &self.block
    }

    /// Bytes per slot (the block's total size).
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of committed slots.
    pub fn len(&self) -> usize {
        self.current.map_or(0, |index| index + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Allocated slots.
    pub fn capacity(&self) -> usize {
        self.data.len() / self.block_size
    }

    /// Incremented every time the arena is reallocated.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Make sure slot `index` exists, keeping at least one spare slot after it.
    pub fn ensure(&mut self, index: usize) -> Result<(), UniformBufferError> {
        if index.saturating_add(1) < self.capacity() {
            return Ok(());
        }
        let overflow = || UniformBufferError::CapacityOverflow {
            index,
            block_size: self.block_size,
        };
        let grown = index
            .checked_add(2)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(overflow)?;
        let new_capacity = grown.max(index + 1);
        let new_len = new_capacity
            .checked_mul(self.block_size)
            .ok_or_else(overflow)?;

        tracing::debug!(
            block = self.block.name(),
            old_capacity = self.capacity(),
            new_capacity,
            "growing uniform block buffer"
        );
        self.data.resize(new_len, 0);
        self.generation += 1;
        Ok(())
    }

    /// Commit a new slot seeded from the previous one and edited by `writer`.
    ///
    /// With `dedupe`, a slot that ends up byte-identical to its predecessor is rolled back and
    /// `false` is returned; the previous slot stays current.
    pub fn push(
        &mut self,
        dedupe: bool,
        writer: impl FnOnce(&mut Uniforms<'_>),
    ) -> Result<bool, UniformBufferError> {
        let index = self.current.map_or(0, |current| current + 1);
        self.ensure(index)?;

        let size = self.block_size;
        let start = index * size;
        if index > 0 {
            self.data.copy_within(start - size..start, start);
        } else {
            self.data[..size].fill(0);
        }
        self.current = Some(index);

        {
            let mut uniforms = Uniforms {
                block: &self.block,
                index,
                bytes: &mut self.data[start..start + size],
            };
            writer(&mut uniforms);
        }

        if dedupe && index > 0 {
            let (prev, next) = self.data[start - size..start + size].split_at(size);
            if prev == next {
                self.current = Some(index - 1);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drop the current slot. Pair with a push that returned `true`.
    pub fn pop(&mut self) {
        debug_assert!(self.current.is_some(), "pop on an empty uniform buffer");
        self.current = self.current.and_then(|index| index.checked_sub(1));
    }

    /// Push a slot, run `body` with it current, then pop it again if it was committed.
    pub fn push_temp<R>(
        &mut self,
        writer: impl FnOnce(&mut Uniforms<'_>),
        body: impl FnOnce(&Self) -> R,
    ) -> Result<R, UniformBufferError> {
        let pushed = self.push(true, writer)?;
        let result = body(self);
        if pushed {
            self.pop();
        }
        Ok(result)
    }

    /// Forget all slots. Memory is kept for the next frame.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Send the committed slots to `target` and return the number of bytes transferred.
    pub fn upload(&self, target: &mut impl UploadTarget) -> usize {
        let len = self.len() * self.block_size;
        tracing::trace!(block = self.block.name(), slots = self.len(), bytes = len, "uniform upload");
        target.upload(&self.data, 0, len);
        len
    }

    pub fn current_ref(&self) -> Option<UniformsRef> {
        self.current.map(|index| UniformsRef {
            block: self.block.id(),
            index,
            generation: self.generation,
        })
    }

    /// Mutable view of the current slot.
    pub fn current_mut(&mut self) -> Option<Uniforms<'_>> {
        let index = self.current?;
        let size = self.block_size;
        Some(Uniforms {
            block: &self.block,
            index,
            bytes: &mut self.data[index * size..(index + 1) * size],
        })
    }

    pub fn read<R>(
        &self,
        slot: UniformsRef,
        f: impl FnOnce(&UniformsView<'_>) -> R,
    ) -> Result<R, UniformBufferError> {
        self.validate(slot)?;
        let view = UniformsView {
            block: &self.block,
            index: slot.index,
            bytes: self.slot(slot.index),
        };
        Ok(f(&view))
    }

    pub fn write<R>(
        &mut self,
        slot: UniformsRef,
        f: impl FnOnce(&mut Uniforms<'_>) -> R,
    ) -> Result<R, UniformBufferError> {
        self.validate(slot)?;
        let size = self.block_size;
        let mut uniforms = Uniforms {
            block: &self.block,
            index: slot.index,
            bytes: &mut self.data[slot.index * size..(slot.index + 1) * size],
        };
        Ok(f(&mut uniforms))
    }

    /// Bytes of committed slot `index`.
    pub fn block_bytes(&self, index: usize) -> Result<&[u8], UniformBufferError> {
        if index >= self.len() {
            return Err(UniformBufferError::OutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(self.slot(index))
    }

    /// All committed slots, back to back.
    pub fn committed_bytes(&self) -> &[u8] {
        &self.data[..self.len() * self.block_size]
    }

    fn slot(&self, index: usize) -> &[u8] {
        &self.data[index * self.block_size..(index + 1) * self.block_size]
    }

    fn validate(&self, slot: UniformsRef) -> Result<(), UniformBufferError> {
        if slot.block != self.block.id() {
            return Err(UniformBufferError::WrongBlock {
                expected: self.block.id(),
                found: slot.block,
            });
        }
        if slot.generation != self.generation {
            return Err(UniformBufferError::StaleRef {
                held: slot.generation,
                current: self.generation,
            });
        }
        if slot.index >= self.len() {
            return Err(UniformBufferError::OutOfRange {
                index: slot.index,
                len: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniform_block::UniformBlockBuilder;
    use crate::upload::MirrorBuffer;

    struct Fields {
        i: TypedUniform<i32>,
        v: TypedUniform<[f32; 4]>,
        m: TypedUniform<Mat4>,
    }

    fn block() -> (Arc<UniformBlock>, Fields) {
        let mut b = UniformBlockBuilder::new(BlockId(0), "SceneUB", 0);
        let fields = Fields {
            i: b.int("u_I"),
            v: b.vec4("u_V"),
            m: b.mat4("u_M"),
        };
        (Arc::new(b.build()), fields)
    }

    #[test]
    fn dedupe_rolls_back_identical_slot() {
        let (block, f) = block();
        let mut buf = UniformBlockBuffer::new(block);

        assert!(buf
            .push(true, |u| {
                u.set(&f.i, &7);
                u.set(&f.v, &[1.0, 2.0, 3.0, 4.0]);
            })
            .unwrap());
        assert!(!buf.push(true, |u| u.set(&f.i, &7)).unwrap());
        assert!(buf.push(true, |u| u.set(&f.i, &8)).unwrap());

        assert_eq!(buf.len(), 2);
        let mut mirror = MirrorBuffer::new();
        assert_eq!(buf.upload(&mut mirror), 512);
        assert_eq!(mirror.contents().len(), 512);

        let slot1 = buf.current_ref().unwrap();
        buf.read(slot1, |u| {
            assert_eq!(u.get(&f.i), 8);
            // Seeded from slot 0.
            assert_eq!(u.get(&f.v), [1.0, 2.0, 3.0, 4.0]);
        })
        .unwrap();
    }

    #[test]
    fn push_without_dedupe_always_commits() {
        let (block, f) = block();
        let mut buf = UniformBlockBuffer::new(block);
        for _ in 0..3 {
            assert!(buf.push(false, |u| u.set(&f.i, &1)).unwrap());
        }
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn first_slot_is_zeroed_and_padding_stays_zero() {
        let (block, f) = block();
        let mut buf = UniformBlockBuffer::new(block);
        buf.push(false, |u| u.set(&f.i, &-1)).unwrap();
        // Dirty the arena, then start a new frame.
        buf.reset();
        buf.push(false, |u| u.set(&f.v, &[1.0; 4])).unwrap();

        let bytes = buf.block_bytes(0).unwrap();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        // Padding between `u_I` and `u_V` and the tail after `u_M`.
        assert!(bytes[4..16].iter().all(|&b| b == 0));
        assert!(bytes[96..].iter().all(|&b| b == 0));
    }

    #[test]
    fn growth_is_geometric_and_invalidates_refs() {
        let (block, f) = block();
        let mut buf = UniformBlockBuffer::new(block);
        assert_eq!(buf.capacity(), 1);

        buf.push(false, |u| u.set(&f.i, &0)).unwrap();
        // Slot 0 needs a spare slot after it: max(1, (0 + 2) * 3).
        assert_eq!(buf.capacity(), 6);
        assert_eq!(buf.generation(), 1);
        let held = buf.current_ref().unwrap();

        for n in 1..5 {
            buf.push(false, |u| u.set(&f.i, &n)).unwrap();
        }
        assert_eq!(buf.capacity(), 6);
        assert!(buf.read(held, |u| u.get(&f.i)).is_ok());

        buf.push(false, |u| u.set(&f.i, &5)).unwrap();
        assert_eq!(buf.capacity(), 21);
        assert_eq!(
            buf.read(held, |u| u.get(&f.i)),
            Err(UniformBufferError::StaleRef { held: 1, current: 2 })
        );

        let fresh = UniformsRef {
            generation: buf.generation(),
            ..held
        };
        assert_eq!(buf.read(fresh, |u| u.get(&f.i)), Ok(0));
    }

    #[test]
    fn pop_and_push_temp_restore_current() {
        let (block, f) = block();
        let mut buf = UniformBlockBuffer::new(block);
        buf.push(true, |u| u.set(&f.i, &1)).unwrap();

        let seen = buf
            .push_temp(|u| u.set(&f.i, &2), |buf| buf.current_index())
            .unwrap();
        assert_eq!(seen, Some(1));
        assert_eq!(buf.current_index(), Some(0));

        // Identical temp push is not committed, so nothing is popped.
        let seen = buf
            .push_temp(|u| u.set(&f.i, &1), |buf| buf.current_index())
            .unwrap();
        assert_eq!(seen, Some(0));
        assert_eq!(buf.current_index(), Some(0));

        buf.pop();
        assert!(buf.is_empty());
        assert_eq!(buf.upload(&mut MirrorBuffer::new()), 0);
    }

    #[test]
    fn matrix_is_written_by_columns() {
        let (block, f) = block();
        let m = Mat4::translation(10.0, 20.0, 30.0);
        let buf = UniformBlockBuffer::single(block, |u| u.set(&f.m, &m)).unwrap();

        let bytes = buf.block_bytes(0).unwrap();
        let cells: &[f32] = bytemuck::cast_slice(&bytes[32..96]);
        assert_eq!(&cells[12..16], &[10.0, 20.0, 30.0, 1.0]);
        assert_eq!(&cells[0..4], &[1.0, 0.0, 0.0, 0.0]);

        let view = buf.current_ref().unwrap();
        assert_eq!(buf.read(view, |u| u.get(&f.m)), Ok(m));
    }

    #[test]
    fn mat3_writes_twelve_cells() {
        let mut b = UniformBlockBuilder::new(BlockId(3), "NormalUB", 0);
        let n = b.mat3("u_Normal");
        let tail = b.float("u_Tail");
        let block = Arc::new(b.build());
        assert_eq!(tail.offset(), 48);

        let mut filled = Mat4::IDENTITY;
        for i in 0..16 {
            filled.set_at_index(i, 5.0);
        }
        let buf = UniformBlockBuffer::single(block, |u| {
            u.set(&tail, &-1.0);
            u.set(&n, &filled);
        })
        .unwrap();
        let bytes = buf.block_bytes(0).unwrap();
        let cells: &[f32] = bytemuck::cast_slice(&bytes[0..52]);
        assert!(cells[..12].iter().all(|&c| c == 5.0));
        assert_eq!(cells[12], -1.0);
    }

    #[test]
    fn arrays_use_element_stride() {
        let mut b = UniformBlockBuilder::new(BlockId(1), "LightsUB", 0);
        let count = b.int("u_Count");
        let lights = b.array(3, |b| b.vec3("u_Lights"));
        let block = Arc::new(b.build());
        assert_eq!(lights.offset(), 16);
        assert_eq!(lights.field().size, 16);

        let buf = UniformBlockBuffer::single(block, |u| {
            u.set(&count, &2);
            u.set(&lights, &[[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]][..]);
        })
        .unwrap();
        let bytes = buf.block_bytes(0).unwrap();
        let cells: &[f32] = bytemuck::cast_slice(&bytes[16..48]);
        assert_eq!(cells, &[1.0, 1.0, 1.0, 0.0, 2.0, 2.0, 2.0, 0.0]);
    }

    #[test]
    fn copy_from_takes_current_slot_of_other_buffer() {
        let (block, f) = block();
        let mut src = UniformBlockBuffer::new(block.clone());
        src.push(false, |u| u.set(&f.i, &1)).unwrap();
        src.push(false, |u| u.set(&f.i, &2)).unwrap();

        let mut dst = UniformBlockBuffer::new(block);
        let mut result = Ok(());
        dst.push(false, |u| result = u.copy_from(&src)).unwrap();
        result.unwrap();
        let slot = dst.current_ref().unwrap();
        assert_eq!(dst.read(slot, |u| u.get(&f.i)), Ok(2));

        let empty = UniformBlockBuffer::new(dst.block().clone());
        let err = dst.write(slot, |u| u.copy_from(&empty)).unwrap();
        assert_eq!(
            err,
            Err(UniformBufferError::Empty {
                block: "SceneUB".to_owned()
            })
        );
    }

    #[test]
    fn refs_are_checked_against_block_and_length() {
        let (block, f) = block();
        let mut buf = UniformBlockBuffer::new(block);
        buf.push(false, |u| u.set(&f.i, &1)).unwrap();
        let slot = buf.current_ref().unwrap();

        let other = UniformsRef {
            block: BlockId(9),
            ..slot
        };
        assert_eq!(
            buf.read(other, |_| ()),
            Err(UniformBufferError::WrongBlock {
                expected: BlockId(0),
                found: BlockId(9)
            })
        );

        buf.reset();
        assert_eq!(
            buf.read(slot, |_| ()),
            Err(UniformBufferError::OutOfRange { index: 0, len: 0 })
        );
    }

    #[test]
    fn copy_from_rejects_other_layout_with_same_id() {
        let mut small = UniformBlockBuilder::new(BlockId(0), "SmallUB", 0);
        let s = small.int("u_S");
        let small = Arc::new(small.build());
        let mut big = UniformBlockBuilder::new(BlockId(0), "BigUB", 0);
        let bones = big.array(5, |b| b.mat4("u_Bones"));
        let big = Arc::new(big.build());
        assert_eq!((small.total_size(), big.total_size()), (256, 512));

        let mut src = UniformBlockBuffer::new(big);
        src.push(false, |u| u.set(&bones, &[Mat4::IDENTITY; 5][..])).unwrap();

        let mut dst = UniformBlockBuffer::new(small);
        let mut result = Ok(());
        dst.push(false, |u| {
            u.set(&s, &3);
            result = u.copy_from(&src);
        })
        .unwrap();
        assert_eq!(
            result,
            Err(UniformBufferError::WrongBlock {
                expected: BlockId(0),
                found: BlockId(0)
            })
        );
        let slot = dst.current_ref().unwrap();
        assert_eq!(dst.read(slot, |u| u.get(&s)), Ok(3));
    }

    #[test]
    fn array_write_stops_at_declared_length() {
        let mut b = UniformBlockBuilder::new(BlockId(2), "ItemsUB", 0);
        let items = b.array(2, |b| b.float("u_Items"));
        let tail = b.float("u_Tail");
        let block = Arc::new(b.build());
        assert_eq!(tail.offset(), 8);

        let buf = UniformBlockBuffer::single(block, |u| {
            u.set(&tail, &-1.0);
            u.set(&items, &[1.0, 2.0, 3.0][..]);
        })
        .unwrap();
        let bytes = buf.block_bytes(0).unwrap();
        let cells: &[f32] = bytemuck::cast_slice(&bytes[0..12]);
        assert_eq!(cells, &[1.0, 2.0, -1.0]);
    }
}
