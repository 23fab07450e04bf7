//! Destinations for committed uniform slots.

/// GPU-side copy of a uniform arena.
///
/// `upload` replaces the destination contents starting at byte 0 with `data[offset..offset + len]`.
pub trait UploadTarget {
    fn upload(&mut self, data: &[u8], offset: usize, len: usize);
}

/// CPU mirror used by tools and tests. Keeps the last uploaded bytes and counts uploads.
#[derive(Debug, Default, Clone)]
pub struct MirrorBuffer {
    contents: Vec<u8>,
    uploads: usize,
    bytes_uploaded: u64,
}

impl MirrorBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.bytes_uploaded
    }
}

impl UploadTarget for MirrorBuffer {
    fn upload(&mut self, data: &[u8], offset: usize, len: usize) {
        let end = offset.saturating_add(len).min(data.len());
        let src = data.get(offset..end).unwrap_or_default();
        if self.contents.len() < src.len() {
            self.contents.resize(src.len(), 0);
        }
        self.contents[..src.len()].copy_from_slice(src);
        self.uploads += 1;
        self.bytes_uploaded += src.len() as u64;
    }
}

/// Writes through `queue.write_buffer` into an existing uniform buffer.
#[cfg(feature = "wgpu")]
pub struct QueueUpload<'a> {
    pub queue: &'a wgpu::Queue,
    pub buffer: &'a wgpu::Buffer,
}

#[cfg(feature = "wgpu")]
impl UploadTarget for QueueUpload<'_> {
    fn upload(&mut self, data: &[u8], offset: usize, len: usize) {
        let end = offset.saturating_add(len).min(data.len());
        let mut src = data.get(offset..end).unwrap_or_default();
        let capacity = usize::try_from(self.buffer.size()).unwrap_or(usize::MAX);
        if src.len() > capacity {
            tracing::warn!(
                requested = src.len(),
                capacity,
                "uniform upload larger than the destination buffer; truncating"
            );
            src = &src[..capacity];
        }
        // Slots are multiples of 256 bytes, so the copy is already COPY_BUFFER_ALIGNMENT sized.
        debug_assert_eq!(src.len() as u64 % wgpu::COPY_BUFFER_ALIGNMENT, 0);
        if !src.is_empty() {
            self.queue.write_buffer(self.buffer, 0, src);
        }
    }
}
