use anyhow::{Context, Result};
use fs2::FileExt;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

/// Default region capacity: 1 MB, matching the cache each node historically
/// carried.
pub const DEFAULT_REGION_CAPACITY: usize = 1024 * 1024;

/// Where and how large a named region is.
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Region name; becomes the backing file name.
    pub name: String,
    /// Capacity in bytes. Writes beyond this fail.
    pub capacity: usize,
    /// Directory for region files.
    pub directory: PathBuf,
}

impl RegionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_REGION_CAPACITY,
            directory: std::env::temp_dir(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    fn path(&self) -> PathBuf {
        self.directory.join(format!("overlay_{}.cache", self.name))
    }
}

enum Backing {
    /// Shared mapping over the region file. The file's advisory lock is the
    /// inter-process exclusion; no language-level primitive lives inside the
    /// mapped bytes.
    Mapped { file: File, mmap: MmapMut },
    /// Process-local fallback when the file cannot be created or mapped.
    Heap(Vec<u8>),
}

/// A named byte region holding one serialized cache image.
///
/// All access goes through [`CacheRegion::with_exclusive`], which holds both
/// the in-process mutex and (for mapped regions) the file lock for the
/// duration of the closure, so a read-modify-write cycle is atomic with
/// respect to co-located processes.
pub struct CacheRegion {
    name: String,
    capacity: usize,
    backing: Mutex<Backing>,
}

impl CacheRegion {
    /// Opens (or creates) the named region. Never fails: mapping problems
    /// degrade to a heap-backed region with identical behavior.
    pub fn open(config: RegionConfig) -> Self {
        let backing = match Self::try_map(&config) {
            Ok((file, mmap)) => Backing::Mapped { file, mmap },
            Err(e) => {
                tracing::warn!(
                    "Falling back to process-local cache region for {}: {:#}",
                    config.name,
                    e
                );
                Backing::Heap(vec![0u8; config.capacity])
            }
        };

        Self {
            name: config.name,
            capacity: config.capacity,
            backing: Mutex::new(backing),
        }
    }

    fn try_map(config: &RegionConfig) -> Result<(File, MmapMut)> {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("failed to create region directory {}", config.directory.display())
        })?;

        let path = config.path();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open region file {}", path.display()))?;

        let current = file
            .metadata()
            .with_context(|| format!("failed to stat region file {}", path.display()))?
            .len();
        if current < config.capacity as u64 {
            file.set_len(config.capacity as u64)
                .with_context(|| format!("failed to size region file {}", path.display()))?;
        }

        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .len(config.capacity)
                .map_mut(&file)
                .with_context(|| format!("failed to map region file {}", path.display()))?
        };

        tracing::debug!("Mapped cache region {} ({} bytes)", config.name, config.capacity);
        Ok((file, mmap))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the region is actually shared with other processes.
    pub fn is_shared(&self) -> bool {
        matches!(*self.backing.lock().unwrap(), Backing::Mapped { .. })
    }

    /// Runs `f` with exclusive access to the region bytes.
    pub fn with_exclusive<R>(&self, f: impl FnOnce(&mut RegionView<'_>) -> R) -> R {
        let mut backing = self.backing.lock().unwrap();
        match &mut *backing {
            Backing::Mapped { file, mmap } => {
                if let Err(e) = file.lock_exclusive() {
                    // The region stays usable; exclusion degrades to the
                    // in-process mutex we already hold.
                    tracing::warn!("Failed to lock region {}: {}", self.name, e);
                }
                let result = f(&mut RegionView { bytes: &mut mmap[..] });
                if let Err(e) = fs2::FileExt::unlock(file) {
                    tracing::warn!("Failed to unlock region {}: {}", self.name, e);
                }
                result
            }
            Backing::Heap(bytes) => f(&mut RegionView {
                bytes: bytes.as_mut_slice(),
            }),
        }
    }
}

/// Exclusive view over the region bytes for the duration of one call.
pub struct RegionView<'a> {
    bytes: &'a mut [u8],
}

impl RegionView<'_> {
    /// The full region contents; the image is self-delimiting, trailing
    /// bytes are stale garbage.
    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Replaces the image. Fails without touching the region when the new
    /// image exceeds capacity.
    pub fn write_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() > self.bytes.len() {
            anyhow::bail!(
                "cache image of {} bytes exceeds region capacity of {}",
                image.len(),
                self.bytes.len()
            );
        }
        self.bytes[..image.len()].copy_from_slice(image);
        Ok(())
    }
}
