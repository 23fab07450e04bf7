use crate::ir::Attribute;
use crate::uniform_block::align_up;

/// Interleaved vertex buffer format: one group of attributes read from a single buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    attributes: Vec<Attribute>,
    positions: Vec<usize>,
    stride: usize,
}

impl VertexLayout {
    /// Attributes are packed in order, each aligned to its component size, unless it carries an
    /// explicit offset. The stride is rounded to the widest component.
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self::build(attributes, None)
    }

    /// Like [`VertexLayout::new`] but with a caller-chosen stride.
    pub fn with_stride(attributes: Vec<Attribute>, stride: usize) -> Self {
        Self::build(attributes, Some(stride))
    }

    fn build(attributes: Vec<Attribute>, stride: Option<usize>) -> Self {
        let mut cursor = 0usize;
        let mut max_align = 1usize;
        let positions = attributes
            .iter()
            .map(|attr| {
                let align = attr.ty.kind().bytes_size().max(1);
                max_align = max_align.max(align);
                cursor = match attr.offset {
                    Some(offset) => offset,
                    None => align_up(cursor, align),
                };
                let position = cursor;
                cursor += attr.ty.bytes_size();
                position
            })
            .collect();
        Self {
            attributes,
            positions,
            stride: stride.unwrap_or_else(|| align_up(cursor, max_align)),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Byte offset of each attribute inside one vertex.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, usize)> {
        self.attributes.iter().zip(self.positions.iter().copied())
    }
}
