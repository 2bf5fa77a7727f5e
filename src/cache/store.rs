use super::region::{CacheRegion, RegionConfig};

use anyhow::Result;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

/// One cached payload with its freshness bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub payload: Vec<u8>,
    /// Monotonic milliseconds at insertion.
    pub inserted_at: i64,
    /// 0 means no expiry.
    pub ttl_ms: i32,
}

/// The TTL-bounded result cache over a named region.
///
/// Every operation re-reads the region image, so co-located node instances
/// observe each other's writes, and rewrites the whole image on mutation.
/// Expired entries are lazily treated as misses and only physically dropped
/// by the next write.
pub struct ResultCache {
    region: CacheRegion,
}

impl ResultCache {
    /// Opens the cache over the named region with default sizing.
    pub fn open(name: impl Into<String>) -> Self {
        Self::with_config(RegionConfig::new(name))
    }

    pub fn with_config(config: RegionConfig) -> Self {
        Self {
            region: CacheRegion::open(config),
        }
    }

    pub fn region(&self) -> &CacheRegion {
        &self.region
    }

    /// Returns the payload iff the entry exists and is fresh. An expired
    /// entry is a miss but is retained until the next write.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = monotonic_ms();
        self.region.with_exclusive(|view| {
            let image = decode_image(view.bytes());
            image.get(key).and_then(|record| {
                if is_fresh(record.inserted_at, record.ttl_ms, now) {
                    Some(record.payload.clone())
                } else {
                    tracing::debug!("Cache entry {} expired", key);
                    None
                }
            })
        })
    }

    /// Overwrites any prior entry under `key`. `ttl_ms == 0` means no
    /// expiry. Fails, leaving the existing image intact, when the resulting
    /// image would exceed the region capacity.
    pub fn put(&self, key: &str, payload: &[u8], ttl_ms: i32) -> Result<()> {
        let now = monotonic_ms();
        let record = CacheRecord {
            payload: payload.to_vec(),
            inserted_at: now,
            ttl_ms,
        };

        self.region.with_exclusive(|view| {
            let mut image = decode_image(view.bytes());
            // Writes are the only place expired entries are physically
            // dropped.
            image.retain(|_, existing| is_fresh(existing.inserted_at, existing.ttl_ms, now));
            image.insert(key.to_string(), record);
            let encoded = encode_image(&image);
            view.write_image(&encoded).map_err(|e| {
                tracing::error!("Cache put for {} rejected: {}", key, e);
                e
            })
        })
    }

    /// Drops the entry. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.region.with_exclusive(|view| {
            let mut image = decode_image(view.bytes());
            if image.remove(key).is_none() {
                return false;
            }
            let encoded = encode_image(&image);
            // The image only shrank; the write cannot fail.
            let _ = view.write_image(&encoded);
            true
        })
    }

    /// Drops all entries.
    pub fn clear(&self) {
        self.region.with_exclusive(|view| {
            let _ = view.write_image(&encode_image(&HashMap::new()));
        });
    }

    /// Number of entries currently in the image, fresh or not.
    pub fn entry_count(&self) -> usize {
        self.region.with_exclusive(|view| decode_image(view.bytes()).len())
    }
}

/// Freshness rule: `ttl_ms == 0` never expires; otherwise the entry is fresh
/// through exactly `inserted_at + ttl_ms` and stale one tick later.
pub fn is_fresh(inserted_at: i64, ttl_ms: i32, now: i64) -> bool {
    ttl_ms == 0 || now - inserted_at <= ttl_ms as i64
}

/// Milliseconds from a process-monotonic clock. Wall-clock adjustments never
/// invalidate cache entries.
pub fn monotonic_ms() -> i64 {
    static BASE: OnceLock<Instant> = OnceLock::new();
    BASE.get_or_init(Instant::now).elapsed().as_millis() as i64
}

// --- Image layout ---
//
// u32 n_entries, then n_entries x {
//     u32 key_len, key bytes,
//     u32 val_len, val bytes,
//     i64 inserted_at, i32 ttl_ms
// }
// All integers little-endian. The image is a prefix of the region; decoding
// stops at the first truncated field so a stale or garbage tail is ignored.

fn encode_image(image: &HashMap<String, CacheRecord>) -> Vec<u8> {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(image.len() as u32).to_le_bytes());

    for (key, record) in image {
        buffer.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buffer.extend_from_slice(key.as_bytes());
        buffer.extend_from_slice(&(record.payload.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&record.payload);
        buffer.extend_from_slice(&record.inserted_at.to_le_bytes());
        buffer.extend_from_slice(&record.ttl_ms.to_le_bytes());
    }

    buffer
}

fn decode_image(bytes: &[u8]) -> HashMap<String, CacheRecord> {
    let mut image = HashMap::new();
    let Some(n_entries) = read_u32(bytes, 0) else {
        return image;
    };

    let mut pos = 4usize;
    for _ in 0..n_entries {
        let Some(key_len) = read_u32(bytes, pos) else {
            break;
        };
        pos += 4;

        let Some(key_bytes) = bytes.get(pos..pos + key_len as usize) else {
            break;
        };
        let key = String::from_utf8_lossy(key_bytes).into_owned();
        pos += key_len as usize;

        let Some(val_len) = read_u32(bytes, pos) else {
            break;
        };
        pos += 4;

        let Some(payload) = bytes.get(pos..pos + val_len as usize) else {
            break;
        };
        let payload = payload.to_vec();
        pos += val_len as usize;

        let Some(tail) = bytes.get(pos..pos + 12) else {
            break;
        };
        let inserted_at = i64::from_le_bytes(tail[..8].try_into().unwrap());
        let ttl_ms = i32::from_le_bytes(tail[8..].try_into().unwrap());
        pos += 12;

        image.insert(key, CacheRecord { payload, inserted_at, ttl_ms });
    }

    image
}

fn read_u32(bytes: &[u8], pos: usize) -> Option<u32> {
    bytes
        .get(pos..pos + 4)
        .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
}
