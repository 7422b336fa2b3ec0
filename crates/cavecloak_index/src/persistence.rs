//! # Tracked Block Persistence
//!
//! Versioned little-endian binary store plus a one-way migration from the
//! legacy text store.
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "CCTB"]
//! [4 bytes: version]
//! [4 bytes: chunk count]
//!
//! Version 2 chunk record:
//! [str: world][i32: chunk x][i32: chunk z]
//! [u32: local palette size][str: descriptor] * size
//! [u8: id width, 1 or 2][u32: block count]
//! block: [i16: y][u8: (local z << 4) | local x][u8 | u16: local palette id]
//!
//! Version 1 chunk record (read only):
//! [str: world][i32: chunk x][i32: chunk z][u32: block count]
//! block: [i32: x][i32: y][i32: z][str: descriptor]
//!
//! str = [u16: byte length][UTF-8 bytes]
//! ```
//!
//! The local palette lists only the appearances a chunk uses, remapped to
//! `0..N` in first-use order. Ids fit one byte when `N <= 255`.
//!
//! ## Failure Handling
//!
//! - Wrong magic or unknown version: warn, load nothing
//! - Truncated or corrupt record: warn, keep what was decoded so far
//! - Unparseable descriptor / out-of-range id: warn, skip that entry
//! - Block whose y does not fit `i16` on save: warn, skip that block
//!
//! ## Legacy Store
//!
//! The legacy file read by `read_legacy` is a TOML rendering of the
//! older plugin's per-entry text store (same fields, one `[[entries]]`
//! table per block). Files written by that plugin in its own text format
//! must be converted to this rendering before they can be migrated.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::Deserialize;

use crate::appearance::BlockAppearance;
use crate::error::{IndexError, IndexResult};
use crate::index::IndexState;
use crate::key::{BlockKey, BlockPos, ChunkKey, WorldName, BLOCK_INDEX_Y_OFFSET, CHUNK_SIZE, LOCAL_COORD_MASK};

/// Magic bytes identifying a tracked block store.
pub const STORE_MAGIC: &[u8; 4] = b"CCTB";

/// Format version written by this build.
pub const STORE_VERSION: u32 = 2;

/// Oldest format version this build still reads.
pub const OLDEST_READABLE_VERSION: u32 = 1;

/// Largest local palette that still uses one-byte ids.
const BYTE_ID_PALETTE_LIMIT: usize = 255;

/// Largest local palette the format can express.
const MAX_LOCAL_PALETTE: usize = u16::MAX as usize + 1;

/// Where loaded data came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadSource {
    /// Nothing to load.
    #[default]
    Empty,
    /// The binary store, in the given format version.
    Binary {
        /// Format version found in the header.
        version: u32,
    },
    /// The legacy text store.
    Legacy,
    /// A file existed but was rejected as a whole.
    Rejected,
}

/// Summary of a load.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Where the data came from.
    pub source: LoadSource,
    /// Chunks holding tracked blocks after the load.
    pub chunks: usize,
    /// Tracked blocks after the load.
    pub blocks: usize,
    /// Entries dropped as unreadable.
    pub skipped: usize,
    /// True if the file ended early and only a prefix was loaded.
    pub truncated: bool,
}

// ============================================================================
// BINARY READ
// ============================================================================

/// Reads the binary store at `path` into an empty `state`.
pub(crate) fn read_binary(path: &Path, state: &mut IndexState) -> IndexResult<LoadReport> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut report = LoadReport::default();

    match decode(&mut reader, state, &mut report) {
        Ok(()) => {}
        Err(err @ (IndexError::BadMagic { .. } | IndexError::UnsupportedVersion(_))) => {
            tracing::warn!("Ignoring tracked block store {}: {}", path.display(), err);
            state.clear();
            report.source = LoadSource::Rejected;
        }
        Err(IndexError::Truncated(context)) => {
            tracing::warn!(
                "Tracked block store {} ends early ({}), keeping the decoded prefix",
                path.display(),
                context
            );
            report.truncated = true;
        }
        Err(err) => return Err(err),
    }

    report.chunks = state.chunks.len();
    report.blocks = state.tracked;
    Ok(report)
}

/// Decodes a complete store from `reader` into `state`.
pub(crate) fn decode<R: Read>(reader: &mut R, state: &mut IndexState, report: &mut LoadReport) -> IndexResult<()> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| IndexError::from_read(e, "header"))?;
    if &magic != STORE_MAGIC {
        return Err(IndexError::BadMagic {
            expected: *STORE_MAGIC,
            found: magic,
        });
    }

    let version = read_u32(reader, "header")?;
    if !(OLDEST_READABLE_VERSION..=STORE_VERSION).contains(&version) {
        return Err(IndexError::UnsupportedVersion(version));
    }
    report.source = LoadSource::Binary { version };

    let chunk_count = read_u32(reader, "header")?;
    for _ in 0..chunk_count {
        if version == 1 {
            decode_chunk_v1(reader, state, report)?;
        } else {
            decode_chunk_v2(reader, state, report)?;
        }
    }
    Ok(())
}

fn decode_chunk_v2<R: Read>(reader: &mut R, state: &mut IndexState, report: &mut LoadReport) -> IndexResult<()> {
    let world = WorldName::new(&read_str(reader, "chunk world")?);
    let chunk_x = read_i32(reader, "chunk x")?;
    let chunk_z = read_i32(reader, "chunk z")?;

    let palette_size = read_u32(reader, "palette size")? as usize;
    if palette_size > MAX_LOCAL_PALETTE {
        return Err(IndexError::Truncated(format!("palette size {palette_size} out of range")));
    }
    let mut local_to_global = Vec::with_capacity(palette_size);
    for _ in 0..palette_size {
        let descriptor = read_str(reader, "palette entry")?;
        match BlockAppearance::parse(&descriptor) {
            Ok(appearance) => local_to_global.push(Some(state.palette.get_or_create_id(&appearance))),
            Err(err) => {
                tracing::warn!("Skipping palette entry in chunk {} {},{}: {}", world, chunk_x, chunk_z, err);
                local_to_global.push(None);
            }
        }
    }

    let wide_ids = match read_u8(reader, "id width")? {
        1 => false,
        2 => true,
        other => return Err(IndexError::Truncated(format!("invalid id width {other}"))),
    };

    let block_count = read_u32(reader, "block count")?;
    for _ in 0..block_count {
        let y = i32::from(read_i16(reader, "block y")?);
        let packed = read_u8(reader, "block xz")?;
        let local_id = if wide_ids {
            usize::from(read_u16(reader, "block id")?)
        } else {
            usize::from(read_u8(reader, "block id")?)
        };

        let Some(global_id) = local_to_global.get(local_id).copied().flatten() else {
            report.skipped += 1;
            continue;
        };
        let local_x = i32::from(packed) & LOCAL_COORD_MASK;
        let local_z = (i32::from(packed) >> 4) & LOCAL_COORD_MASK;
        let pos = BlockPos::new(chunk_x * CHUNK_SIZE + local_x, y, chunk_z * CHUNK_SIZE + local_z);
        state.insert_id(ChunkKey::new(world.clone(), chunk_x, chunk_z), pos, global_id);
    }
    Ok(())
}

fn decode_chunk_v1<R: Read>(reader: &mut R, state: &mut IndexState, report: &mut LoadReport) -> IndexResult<()> {
    let world = WorldName::new(&read_str(reader, "chunk world")?);
    let _chunk_x = read_i32(reader, "chunk x")?;
    let _chunk_z = read_i32(reader, "chunk z")?;

    let block_count = read_u32(reader, "block count")?;
    for _ in 0..block_count {
        let x = read_i32(reader, "block x")?;
        let y = read_i32(reader, "block y")?;
        let z = read_i32(reader, "block z")?;
        let descriptor = read_str(reader, "block descriptor")?;
        match BlockAppearance::parse(&descriptor) {
            Ok(appearance) => {
                state.track(&BlockKey::new(world.clone(), BlockPos::new(x, y, z)), &appearance);
            }
            Err(err) => {
                tracing::warn!("Skipping v1 block {} ({},{},{}): {}", world, x, y, z, err);
                report.skipped += 1;
            }
        }
    }
    Ok(())
}

fn read_u8<R: Read>(reader: &mut R, context: &str) -> IndexResult<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).map_err(|e| IndexError::from_read(e, context))?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R, context: &str) -> IndexResult<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).map_err(|e| IndexError::from_read(e, context))?;
    Ok(u16::from_le_bytes(buf))
}

fn read_i16<R: Read>(reader: &mut R, context: &str) -> IndexResult<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).map_err(|e| IndexError::from_read(e, context))?;
    Ok(i16::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R, context: &str) -> IndexResult<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| IndexError::from_read(e, context))?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R, context: &str) -> IndexResult<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| IndexError::from_read(e, context))?;
    Ok(i32::from_le_bytes(buf))
}

fn read_str<R: Read>(reader: &mut R, context: &str) -> IndexResult<String> {
    let len = usize::from(read_u16(reader, context)?);
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| IndexError::from_read(e, context))?;
    String::from_utf8(buf).map_err(|_| IndexError::Truncated(format!("{context}: invalid UTF-8")))
}

// ============================================================================
// BINARY WRITE
// ============================================================================

/// Writes `state` as a version 2 store, replacing `path` atomically.
pub(crate) fn write_binary(path: &Path, state: &IndexState) -> IndexResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let temp = path.with_extension("dat.tmp");
    {
        let file = File::create(&temp)?;
        let mut writer = BufWriter::new(file);
        encode(&mut writer, state)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&temp, path)?;
    Ok(())
}

/// Encodes `state` as a version 2 store.
pub(crate) fn encode<W: Write>(writer: &mut W, state: &IndexState) -> IndexResult<()> {
    writer.write_all(STORE_MAGIC)?;
    writer.write_all(&STORE_VERSION.to_le_bytes())?;

    let chunks: Vec<_> = state.chunks.iter().filter(|(_, store)| !store.is_empty()).collect();
    writer.write_all(&len_u32(chunks.len())?.to_le_bytes())?;

    let mut local_ids: HashMap<u32, u16> = HashMap::new();
    let mut local_order: Vec<u32> = Vec::new();
    let mut entries: Vec<(i16, u8, u16)> = Vec::new();

    for (chunk, store) in chunks {
        local_ids.clear();
        local_order.clear();
        entries.clear();

        let mut overflow = false;
        let mut unstorable = 0usize;
        store.for_each(|index, global_id| {
            let Ok(y) = i16::try_from((index >> 8) - BLOCK_INDEX_Y_OFFSET) else {
                unstorable += 1;
                return;
            };
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let packed = (index & 0xFF) as u8;
            let next = local_order.len();
            let local = *local_ids.entry(global_id).or_insert_with(|| {
                local_order.push(global_id);
                u16::try_from(next).unwrap_or_else(|_| {
                    overflow = true;
                    u16::MAX
                })
            });
            entries.push((y, packed, local));
        });
        if unstorable > 0 {
            tracing::warn!(
                "Skipped {} blocks with unstorable y in chunk {},{} of {}",
                unstorable,
                chunk.x,
                chunk.z,
                chunk.world
            );
        }
        if overflow || local_order.len() > MAX_LOCAL_PALETTE {
            return Err(IndexError::PaletteOverflow(local_order.len()));
        }

        write_str(writer, chunk.world.as_str())?;
        writer.write_all(&chunk.x.to_le_bytes())?;
        writer.write_all(&chunk.z.to_le_bytes())?;

        writer.write_all(&len_u32(local_order.len())?.to_le_bytes())?;
        for &global_id in &local_order {
            let descriptor = state
                .palette
                .get_serialized(global_id)
                .ok_or_else(|| IndexError::Truncated(format!("palette id {global_id} missing")))?;
            write_str(writer, descriptor)?;
        }

        let byte_ids = local_order.len() <= BYTE_ID_PALETTE_LIMIT;
        writer.write_all(&[if byte_ids { 1 } else { 2 }])?;
        writer.write_all(&len_u32(entries.len())?.to_le_bytes())?;
        for &(y, packed, local) in &entries {
            writer.write_all(&y.to_le_bytes())?;
            writer.write_all(&[packed])?;
            if byte_ids {
                #[allow(clippy::cast_possible_truncation)]
                let narrow = local as u8;
                writer.write_all(&[narrow])?;
            } else {
                writer.write_all(&local.to_le_bytes())?;
            }
        }
    }
    Ok(())
}

fn len_u32(len: usize) -> IndexResult<u32> {
    u32::try_from(len).map_err(|_| IndexError::PaletteOverflow(len))
}

fn write_str<W: Write>(writer: &mut W, value: &str) -> IndexResult<()> {
    let len = u16::try_from(value.len()).map_err(|_| IndexError::InvalidDescriptor {
        descriptor: value.chars().take(64).collect(),
        reason: "longer than 65535 bytes",
    })?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

// ============================================================================
// LEGACY TEXT STORE
// ============================================================================

/// Shape of the legacy text store:
///
/// ```toml
/// [[entries]]
/// world = "world"
/// x = 10
/// y = 12
/// z = -4
/// block_data = "minecraft:stone"
/// ```
#[derive(Debug, Default, Deserialize)]
struct LegacyStore {
    #[serde(default)]
    entries: Vec<toml::Value>,
}

/// Reads the legacy text store at `path` into an empty `state`.
pub(crate) fn read_legacy(path: &Path, state: &mut IndexState) -> IndexResult<LoadReport> {
    let text = fs::read_to_string(path)?;
    let mut report = LoadReport {
        source: LoadSource::Legacy,
        ..LoadReport::default()
    };

    let store: LegacyStore = match toml::from_str(&text) {
        Ok(store) => store,
        Err(err) => {
            tracing::warn!("Ignoring legacy tracked block store {}: {}", path.display(), err);
            report.source = LoadSource::Rejected;
            return Ok(report);
        }
    };

    for entry in &store.entries {
        match legacy_entry(entry) {
            Some((key, appearance)) => {
                state.track(&key, &appearance);
            }
            None => {
                tracing::warn!("Skipping malformed legacy entry: {}", entry);
                report.skipped += 1;
            }
        }
    }

    report.chunks = state.chunks.len();
    report.blocks = state.tracked;
    Ok(report)
}

fn legacy_entry(entry: &toml::Value) -> Option<(BlockKey, BlockAppearance)> {
    let table = entry.as_table()?;
    let world = table.get("world")?.as_str()?;
    let coord = |name: &str| table.get(name)?.as_integer().and_then(|v| i32::try_from(v).ok());
    let (x, y, z) = (coord("x")?, coord("y")?, coord("z")?);
    let appearance = BlockAppearance::parse(table.get("block_data")?.as_str()?).ok()?;
    if world.is_empty() {
        return None;
    }
    Some((BlockKey::new(WorldName::new(world), BlockPos::new(x, y, z)), appearance))
}
