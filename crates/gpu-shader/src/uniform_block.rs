//! Uniform block declarations: byte layout under GPU alignment rules and a registry of block
//! types.
//!
//! A block is declared once through a [`UniformBlockBuilder`]. Every field handle returned by the
//! builder ([`TypedUniform`]) carries the field's byte offset; the finished [`UniformBlock`] is
//! immutable and shared through `Arc`.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use hashbrown::HashMap;
use thiserror::Error;

use crate::ir::{ArrayLen, Uniform};
use crate::math::Mat4;
use crate::types::{Precision, VarType};

/// Every block instance occupies a multiple of this many bytes so slots can be bound at dynamic
/// offsets.
pub const UNIFORM_BLOCK_ALIGNMENT: usize = 256;

/// Round `value` up to the nearest multiple of `alignment`.
///
/// `alignment` must be > 0.
pub fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);

    let add = alignment - 1;
    match value.checked_add(add) {
        Some(v) => v / alignment * alignment,
        None => usize::MAX / alignment * alignment,
    }
}

/// Cursor that hands out aligned offsets.
///
/// The final size is a snapshot: once [`LayoutBuilder::size`] has been queried, further
/// allocations are a bug.
#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    offset: usize,
    max_align: usize,
    frozen: bool,
}

impl Default for LayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutBuilder {
    pub fn new() -> Self {
        Self {
            offset: 0,
            max_align: 4,
            frozen: false,
        }
    }

    /// Allocate `size` bytes aligned to `align` and return their offset.
    pub fn alloc(&mut self, size: usize, align: usize) -> usize {
        debug_assert!(!self.frozen, "allocation after the block size was queried");
        let align = align.max(1);
        self.max_align = self.max_align.max(align);
        let offset = align_up(self.offset, align);
        self.offset = offset.saturating_add(size);
        offset
    }

    /// Current end offset, rounded up to the widest alignment seen so far. Freezes the layout.
    pub fn size(&mut self) -> usize {
        self.frozen = true;
        align_up(self.offset, self.max_align)
    }

    /// Next unaligned free offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn max_align(&self) -> usize {
        self.max_align
    }

    fn snapshot(&self) -> (usize, usize) {
        (self.offset, self.max_align)
    }

    fn restore(&mut self, (offset, max_align): (usize, usize)) {
        self.offset = offset;
        self.max_align = max_align;
    }
}

/// Index of a block inside its [`UniformBlockRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// One declared field with its per-element footprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformField {
    pub uniform: Uniform,
    /// Bytes of one element. For arrays this is the stride: element size rounded to its
    /// alignment.
    pub size: usize,
    pub align: usize,
}

impl UniformField {
    pub fn name(&self) -> &str {
        &self.uniform.name
    }

    pub fn offset(&self) -> usize {
        self.uniform.offset
    }

    pub fn ty(&self) -> VarType {
        self.uniform.ty
    }

    /// Bytes this field occupies in the fixed part of the block.
    pub fn footprint(&self) -> usize {
        match self.uniform.array {
            None => self.size,
            Some(ArrayLen::Fixed(n)) => self.size * n,
            Some(ArrayLen::Unbounded) => 0,
        }
    }
}

/// Field handle whose `T` picks the value type accepted by [`crate::Uniforms::set`].
pub struct TypedUniform<T: ?Sized> {
    field: UniformField,
    _marker: PhantomData<fn(&T)>,
}

impl<T: ?Sized> TypedUniform<T> {
    fn new(field: UniformField) -> Self {
        Self {
            field,
            _marker: PhantomData,
        }
    }

    pub fn field(&self) -> &UniformField {
        &self.field
    }

    pub fn uniform(&self) -> &Uniform {
        &self.field.uniform
    }

    pub fn offset(&self) -> usize {
        self.field.uniform.offset
    }

    pub fn block(&self) -> BlockId {
        self.field.uniform.block
    }
}

impl<T: ?Sized> Clone for TypedUniform<T> {
    fn clone(&self) -> Self {
        Self::new(self.field.clone())
    }
}

impl<T: ?Sized> fmt::Debug for TypedUniform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedUniform")
            .field("name", &self.field.uniform.name)
            .field("offset", &self.field.uniform.offset)
            .field("ty", &self.field.uniform.ty)
            .finish()
    }
}

pub struct UniformBlockBuilder {
    id: BlockId,
    name: String,
    fixed_location: u32,
    layout: LayoutBuilder,
    fields: Vec<UniformField>,
    closed: bool,
}

impl UniformBlockBuilder {
    pub fn new(id: BlockId, name: impl Into<String>, fixed_location: u32) -> Self {
        Self {
            id,
            name: name.into(),
            fixed_location,
            layout: LayoutBuilder::new(),
            fields: Vec::new(),
            closed: false,
        }
    }

    /// Declare a raw field of `size` bytes aligned to `align`.
    pub fn field<T: ?Sized>(
        &mut self,
        name: impl Into<String>,
        ty: VarType,
        size: usize,
        align: usize,
    ) -> TypedUniform<T> {
        self.push_field(name.into(), ty, None, size, align, size)
    }

    pub fn int(&mut self, name: impl Into<String>) -> TypedUniform<i32> {
        self.field(name, VarType::SInt1, 4, 4)
    }

    pub fn float(&mut self, name: impl Into<String>) -> TypedUniform<f32> {
        self.field(name, VarType::Float1, 4, 4)
    }

    pub fn ivec2(&mut self, name: impl Into<String>) -> TypedUniform<[i32; 2]> {
        self.field(name, VarType::SInt2, 8, 8)
    }

    pub fn vec2(&mut self, name: impl Into<String>) -> TypedUniform<[f32; 2]> {
        self.field(name, VarType::Float2, 8, 8)
    }

    pub fn vec3(&mut self, name: impl Into<String>) -> TypedUniform<[f32; 3]> {
        self.field(name, VarType::Float3, 12, 16)
    }

    pub fn ivec4(&mut self, name: impl Into<String>) -> TypedUniform<[i32; 4]> {
        self.field(name, VarType::SInt4, 16, 16)
    }

    pub fn vec4(&mut self, name: impl Into<String>) -> TypedUniform<[f32; 4]> {
        self.field(name, VarType::Float4, 16, 16)
    }

    /// Three `float4` columns; only the first 12 cells of the matrix are stored.
    pub fn mat3(&mut self, name: impl Into<String>) -> TypedUniform<Mat4> {
        self.field(name, VarType::Mat3, 48, 16)
    }

    pub fn mat4(&mut self, name: impl Into<String>) -> TypedUniform<Mat4> {
        self.field(name, VarType::Mat4, 64, 16)
    }

    /// `count` contiguous elements shaped like the field `element` declares.
    ///
    /// `element` runs against this builder, but its allocation and field entry are rolled back;
    /// only its size, alignment, name and type are kept.
    pub fn array<T>(
        &mut self,
        count: usize,
        element: impl FnOnce(&mut Self) -> TypedUniform<T>,
    ) -> TypedUniform<[T]> {
        let (field, stride) = self.probe(element);
        self.push_field(
            field.uniform.name,
            field.uniform.ty,
            Some(ArrayLen::Fixed(count)),
            stride,
            field.align,
            stride.saturating_mul(count),
        )
    }

    /// Trailing array whose length is only known when the buffer is bound. Must be the last
    /// field; it adds nothing to the fixed block size.
    pub fn last_variadic_array<T>(
        &mut self,
        element: impl FnOnce(&mut Self) -> TypedUniform<T>,
    ) -> TypedUniform<[T]> {
        let (field, stride) = self.probe(element);
        let handle = self.push_field(
            field.uniform.name,
            field.uniform.ty,
            Some(ArrayLen::Unbounded),
            stride,
            field.align,
            0,
        );
        self.closed = true;
        handle
    }

    pub fn build(mut self) -> UniformBlock {
        let raw_size = self.layout.size();
        let total_size = align_up(raw_size.max(1), UNIFORM_BLOCK_ALIGNMENT);
        UniformBlock {
            id: self.id,
            name: self.name,
            fixed_location: self.fixed_location,
            fields: self.fields,
            raw_size,
            total_size,
        }
    }

    fn probe<T>(&mut self, element: impl FnOnce(&mut Self) -> TypedUniform<T>) -> (UniformField, usize) {
        let saved = self.layout.snapshot();
        let field_count = self.fields.len();
        let handle = element(self);
        self.layout.restore(saved);
        self.fields.truncate(field_count);
        let field = handle.field;
        let stride = align_up(field.size, field.align.max(1));
        (field, stride)
    }

    fn push_field<T: ?Sized>(
        &mut self,
        name: String,
        ty: VarType,
        array: Option<ArrayLen>,
        size: usize,
        align: usize,
        alloc_size: usize,
    ) -> TypedUniform<T> {
        debug_assert!(
            !self.closed,
            "field `{name}` declared after the variadic array of block `{}`",
            self.name
        );
        let offset = self.layout.alloc(alloc_size, align);
        let field = UniformField {
            uniform: Uniform {
                name,
                ty,
                array,
                precision: Precision::Default,
                offset,
                block: self.id,
            },
            size,
            align,
        };
        self.fields.push(field.clone());
        TypedUniform::new(field)
    }
}

/// Finished block layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformBlock {
    id: BlockId,
    name: String,
    fixed_location: u32,
    fields: Vec<UniformField>,
    raw_size: usize,
    total_size: usize,
}

impl UniformBlock {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fixed_location(&self) -> u32 {
        self.fixed_location
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[UniformField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.uniform.name == name)
    }

    pub fn uniforms(&self) -> impl Iterator<Item = &Uniform> {
        self.fields.iter().map(|f| &f.uniform)
    }

    /// Size rounded to the widest field alignment, before the 256-byte slot rounding.
    pub fn raw_size(&self) -> usize {
        self.raw_size
    }

    /// Size of one slot in a [`crate::UniformBlockBuffer`].
    pub fn total_size(&self) -> usize {
        self.total_size
    }
}

/// A Rust type describing one uniform block: its fields are the handles returned by `declare`.
///
/// ```
/// use gpu_shader::{Mat4, TypedUniform, UniformBlockBuilder, UniformBlockDecl};
///
/// struct ProjViewUB {
///     proj: TypedUniform<Mat4>,
///     view: TypedUniform<Mat4>,
/// }
///
/// impl UniformBlockDecl for ProjViewUB {
///     const NAME: &'static str = "ProjViewUB";
///     const FIXED_LOCATION: u32 = 0;
///
///     fn declare(b: &mut UniformBlockBuilder) -> Self {
///         Self {
///             proj: b.mat4("u_ProjMat"),
///             view: b.mat4("u_ViewMat"),
///         }
///     }
/// }
/// ```
pub trait UniformBlockDecl: Sized + Send + Sync + 'static {
    const NAME: &'static str;
    const FIXED_LOCATION: u32;

    fn declare(builder: &mut UniformBlockBuilder) -> Self;
}

/// A declared block type together with its layout.
#[derive(Debug)]
pub struct RegisteredBlock<T> {
    pub block: Arc<UniformBlock>,
    pub fields: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("uniform block name `{name}` is already registered by another type")]
    DuplicateBlockName { name: String },
    #[error("uniform block `{name}` has not been registered")]
    UnregisteredBlock { name: &'static str },
    #[error("too many uniform blocks")]
    TooManyBlocks,
}

/// Holds each declared block type exactly once, keyed by its Rust type.
#[derive(Default)]
pub struct UniformBlockRegistry {
    by_type: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    by_name: HashMap<String, BlockId>,
    blocks: Vec<Arc<UniformBlock>>,
}

impl UniformBlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `T` on first use; later calls return the same block.
    pub fn register<T: UniformBlockDecl>(&mut self) -> Result<&RegisteredBlock<T>, LayoutError> {
        let type_id = TypeId::of::<T>();
        if !self.by_type.contains_key(&type_id) {
            if self.by_name.contains_key(T::NAME) {
                return Err(LayoutError::DuplicateBlockName {
                    name: T::NAME.to_owned(),
                });
            }
            let id = BlockId(
                u32::try_from(self.blocks.len()).map_err(|_| LayoutError::TooManyBlocks)?,
            );
            let mut builder = UniformBlockBuilder::new(id, T::NAME, T::FIXED_LOCATION);
            let fields = T::declare(&mut builder);
            let block = Arc::new(builder.build());
            tracing::debug!(
                block = T::NAME,
                fields = block.fields().len(),
                size = block.total_size(),
                "registered uniform block"
            );
            self.blocks.push(block.clone());
            self.by_name.insert(T::NAME.to_owned(), id);
            self.by_type
                .insert(type_id, Box::new(RegisteredBlock { block, fields }));
        }
        self.get::<T>()
    }

    pub fn get<T: UniformBlockDecl>(&self) -> Result<&RegisteredBlock<T>, LayoutError> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<RegisteredBlock<T>>())
            .ok_or(LayoutError::UnregisteredBlock { name: T::NAME })
    }

    pub fn block(&self, id: BlockId) -> Option<&Arc<UniformBlock>> {
        self.blocks.get(id.0 as usize)
    }

    pub fn block_by_name(&self, name: &str) -> Option<&Arc<UniformBlock>> {
        self.by_name.get(name).and_then(|id| self.block(*id))
    }

    /// Blocks in registration order.
    pub fn blocks(&self) -> &[Arc<UniformBlock>] {
        &self.blocks
    }
}

impl fmt::Debug for UniformBlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformBlockRegistry")
            .field("blocks", &self.blocks)
            .finish()
    }
}
