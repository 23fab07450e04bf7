use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;

use gpu_shader::Program;
use lru::LruCache;
use xxhash_rust::xxh3::Xxh3;

use crate::error::MslError;
use crate::generator::{generate_msl_with_options, GeneratedShader, MslOptions};
use crate::input_layout::BufferLayouts;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderCacheLookupSource {
    /// The shader was already present in the in-memory cache.
    Memory,
    /// The generator ran and the output was inserted into the cache.
    Generated,
}

#[derive(Debug)]
pub struct ShaderCacheLookup {
    pub source: ShaderCacheLookupSource,
    shader: Arc<GeneratedShader>,
}

impl ShaderCacheLookup {
    /// Shared handle to the generated shader.
    pub fn shader(&self) -> &Arc<GeneratedShader> {
        &self.shader
    }
}

impl std::ops::Deref for ShaderCacheLookup {
    type Target = GeneratedShader;

    fn deref(&self) -> &Self::Target {
        &self.shader
    }
}

/// Bounded in-memory cache of generated MSL, keyed by an xxh3 hash of the program IR and its
/// buffer layouts.
pub struct ShaderCache {
    entries: LruCache<u64, Arc<GeneratedShader>>,
    options: MslOptions,
    hits: u64,
    misses: u64,
}

impl ShaderCache {
    pub fn new(options: MslOptions) -> Self {
        Self::with_capacity(options, NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }

    pub fn with_capacity(options: MslOptions, capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            options,
            hits: 0,
            misses: 0,
        }
    }

    pub fn options(&self) -> &MslOptions {
        &self.options
    }

    /// Changing the options invalidates every cached source.
    pub fn set_options(&mut self, options: MslOptions) {
        if self.options != options {
            tracing::debug!(dropped = self.entries.len(), "MSL options changed; clearing shader cache");
            self.options = options;
            self.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn get_or_generate(
        &mut self,
        program: &Program,
        layouts: &BufferLayouts,
    ) -> Result<ShaderCacheLookup, MslError> {
        let key = cache_key(program, layouts);
        if let Some(shader) = self.entries.get(&key) {
            self.hits += 1;
            tracing::trace!(program = %program.name, key, "shader cache hit");
            return Ok(ShaderCacheLookup {
                source: ShaderCacheLookupSource::Memory,
                shader: Arc::clone(shader),
            });
        }

        self.misses += 1;
        let shader = Arc::new(generate_msl_with_options(program, layouts, &self.options)?);
        if let Some((evicted, _)) = self.entries.push(key, Arc::clone(&shader)) {
            if evicted != key {
                tracing::trace!(evicted, "shader cache evicted least recently used entry");
            }
        }
        tracing::debug!(program = %program.name, key, "shader cache miss");
        Ok(ShaderCacheLookup {
            source: ShaderCacheLookupSource::Generated,
            shader,
        })
    }
}

impl Default for ShaderCache {
    fn default() -> Self {
        Self::new(MslOptions::default())
    }
}

impl std::fmt::Debug for ShaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderCache")
            .field("len", &self.entries.len())
            .field("cap", &self.entries.cap())
            .field("options", &self.options)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

fn cache_key(program: &Program, layouts: &BufferLayouts) -> u64 {
    let mut hasher = Xxh3::new();
    program.hash(&mut hasher);
    layouts.hash(&mut hasher);
    hasher.finish()
}
