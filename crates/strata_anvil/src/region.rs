//! Region files holding the encoded records of 32x32 chunk columns.
//!
//! A region file opens with two 4 KiB tables of 1024 big endian `u32`s. The
//! first gives each chunk's location: the first sector in the high 24 bits and
//! the sector count in the low 8. The second gives the time the chunk was last
//! written, in seconds since the epoch. Each record then occupies its own run
//! of sectors as a frame: a `u32` length, a compression byte and the
//! compressed record, padded to the sector boundary.
//!
//! Frames that would need more than 255 sectors keep only the compression
//! byte, with its high bit set, and the record goes to `c.x.z.mcc` beside the
//! region file.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bitvec::vec::BitVec;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use strata_protocol::ChunkPos;
use thiserror::Error;

const SECTOR: usize = 4096;
const REGION_EDGE: i32 = 32;
const CHUNKS_PER_REGION: usize = (REGION_EDGE * REGION_EDGE) as usize;
const HEADER_SECTORS: usize = 2;
/// The sector count of a location is a single byte.
const MAX_FRAME_SECTORS: usize = 255;
/// Length and compression byte in front of every frame.
const FRAME_PREFIX: usize = 5;
const EXTERNAL: u8 = 0x80;

const OPEN_REGIONS: NonZeroUsize = match NonZeroUsize::new(256) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegionError {
    #[error("region file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("chunk data starts at sector {0}, inside the region header")]
    SectorInHeader(u32),
    #[error("chunk frame has no compression byte")]
    EmptyFrame,
    #[error("chunk frame of {len} bytes does not fit in its {sectors} sectors")]
    FrameOverrun { len: usize, sectors: u32 },
    #[error("unknown compression scheme {0}")]
    UnknownCompression(u8),
    #[error("chunk {pos:?} compresses to {len} bytes, too large for a region file")]
    Oversized { pos: ChunkPos, len: usize },
}

/// How records are compressed inside region files.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
#[non_exhaustive]
pub enum Compression {
    Gzip = 1,
    #[default]
    Zlib = 2,
    None = 3,
}

impl Compression {
    fn from_byte(byte: u8) -> Option<Self> {
        [Self::Gzip, Self::Zlib, Self::None]
            .into_iter()
            .find(|c| *c as u8 == byte)
    }

    fn compress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        let out = Vec::with_capacity(data.len() / 2);
        let level = flate2::Compression::default();

        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(out, level);
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(out, level);
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }

    fn decompress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = vec![];
        match self {
            Self::Gzip => GzDecoder::new(data).read_to_end(&mut out)?,
            Self::Zlib => ZlibDecoder::new(data).read_to_end(&mut out)?,
            Self::None => return Ok(data.to_vec()),
        };
        Ok(out)
    }
}

/// A stored record as read back from a region file.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// Seconds since the epoch at which the record was written.
    pub written_at: u32,
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct RegionPos {
    x: i32,
    z: i32,
}

impl RegionPos {
    fn of(pos: ChunkPos) -> Self {
        Self {
            x: pos.x.div_euclid(REGION_EDGE),
            z: pos.z.div_euclid(REGION_EDGE),
        }
    }

    fn file_name(self) -> String {
        format!("r.{}.{}.mca", self.x, self.z)
    }
}

/// Position of a chunk in its region's tables.
fn table_index(pos: ChunkPos) -> usize {
    (pos.x.rem_euclid(REGION_EDGE) + pos.z.rem_euclid(REGION_EDGE) * REGION_EDGE) as usize
}

fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
struct Location {
    first: u32,
    count: u32,
}

impl Location {
    fn from_bits(bits: u32) -> Self {
        Self {
            first: bits >> 8,
            count: bits & 0xff,
        }
    }

    fn to_bits(self) -> u32 {
        (self.first << 8) | self.count
    }

    fn is_unset(self) -> bool {
        self == Self::default()
    }

    fn sectors(self) -> Range<usize> {
        let first = self.first as usize;
        first..first + self.count as usize
    }
}

/// Which sectors of a region file are taken. The header is always taken.
#[derive(Debug)]
struct SectorMap(BitVec);

impl SectorMap {
    fn new() -> Self {
        Self(BitVec::repeat(true, HEADER_SECTORS))
    }

    fn take(&mut self, sectors: Range<usize>) {
        if self.0.len() < sectors.end {
            self.0.resize(sectors.end, false);
        }
        self.0[sectors].fill(true);
    }

    fn release(&mut self, sectors: Range<usize>) {
        let len = self.0.len();
        let start = sectors.start.clamp(HEADER_SECTORS, len);
        self.0[start..sectors.end.clamp(start, len)].fill(false);
    }

    /// Takes the first run of `count` free sectors. The run may extend past
    /// the end of the file.
    fn allocate(&mut self, count: usize) -> usize {
        let mut from = HEADER_SECTORS;
        let start = loop {
            let start = self.0[from..].first_zero().map_or(self.0.len(), |i| from + i);
            let end = self.0[start..].first_one().map_or(usize::MAX, |i| start + i);
            if end - start >= count {
                break start;
            }
            from = end;
        };

        self.take(start..start + count);
        start
    }
}

#[derive(Debug)]
struct RegionFile {
    file: File,
    locations: Vec<Location>,
    timestamps: Vec<u32>,
    sectors: SectorMap,
}

struct Frame {
    scheme: u8,
    body: Vec<u8>,
    written_at: u32,
}

impl RegionFile {
    /// Opens the region file at `path`, creating it with empty tables if it
    /// does not exist.
    fn open_or_create(path: &Path) -> Result<Self, RegionError> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() == 0 {
            file.write_all(&[0; HEADER_SECTORS * SECTOR])?;
            return Ok(Self {
                file,
                locations: vec![Location::default(); CHUNKS_PER_REGION],
                timestamps: vec![0; CHUNKS_PER_REGION],
                sectors: SectorMap::new(),
            });
        }

        Self::open(file)
    }

    fn open(mut file: File) -> Result<Self, RegionError> {
        let mut raw = vec![0; CHUNKS_PER_REGION];
        file.read_u32_into::<BigEndian>(&mut raw)?;
        let mut timestamps = vec![0; CHUNKS_PER_REGION];
        file.read_u32_into::<BigEndian>(&mut timestamps)?;

        let file_sectors = file.metadata()?.len().div_ceil(SECTOR as u64);
        let locations: Vec<_> = raw.into_iter().map(Location::from_bits).collect();

        let mut sectors = SectorMap::new();
        for loc in &locations {
            // Locations into the header or past the end of the file are
            // rejected when read, so they claim nothing.
            let start = loc.first as usize;
            if loc.count > 0 && start >= HEADER_SECTORS && u64::from(loc.first) < file_sectors {
                sectors.take(loc.sectors());
            }
        }

        Ok(Self {
            file,
            locations,
            timestamps,
            sectors,
        })
    }

    fn read_frame(&mut self, index: usize) -> Result<Option<Frame>, RegionError> {
        let loc = self.locations[index];
        if loc.is_unset() {
            return Ok(None);
        }
        if (loc.first as usize) < HEADER_SECTORS {
            return Err(RegionError::SectorInHeader(loc.first));
        }

        self.file
            .seek(SeekFrom::Start((loc.first as usize * SECTOR) as u64))?;
        let len = self.file.read_u32::<BigEndian>()? as usize;
        if len == 0 {
            return Err(RegionError::EmptyFrame);
        }
        if len + 4 > loc.count as usize * SECTOR {
            return Err(RegionError::FrameOverrun {
                len,
                sectors: loc.count,
            });
        }

        let scheme = self.file.read_u8()?;
        let mut body = vec![0; len - 1];
        self.file.read_exact(&mut body)?;

        Ok(Some(Frame {
            scheme,
            body,
            written_at: self.timestamps[index],
        }))
    }

    /// Replaces the frame at `index`. The old frame's sectors may be reused
    /// for the new one.
    fn write_frame(&mut self, index: usize, scheme: u8, body: &[u8]) -> Result<(), RegionError> {
        self.sectors.release(self.locations[index].sectors());

        let count = (FRAME_PREFIX + body.len()).div_ceil(SECTOR);
        let first = self.sectors.allocate(count);

        let mut frame = Vec::with_capacity(count * SECTOR);
        frame.write_u32::<BigEndian>((body.len() + 1) as u32)?;
        frame.push(scheme);
        frame.extend_from_slice(body);
        frame.resize(count * SECTOR, 0);

        self.file.seek(SeekFrom::Start((first * SECTOR) as u64))?;
        self.file.write_all(&frame)?;

        let loc = Location {
            first: first as u32,
            count: count as u32,
        };
        self.set_entry(index, loc, now())
    }

    /// Returns whether there was a frame to remove. The file does not shrink.
    fn clear(&mut self, index: usize) -> Result<bool, RegionError> {
        let loc = self.locations[index];
        if loc.is_unset() {
            return Ok(false);
        }

        self.sectors.release(loc.sectors());
        self.set_entry(index, Location::default(), 0)?;
        Ok(true)
    }

    fn set_entry(&mut self, index: usize, loc: Location, written_at: u32) -> Result<(), RegionError> {
        let offset = (index * 4) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_u32::<BigEndian>(loc.to_bits())?;
        self.file.seek(SeekFrom::Start(offset + SECTOR as u64))?;
        self.file.write_u32::<BigEndian>(written_at)?;

        self.locations[index] = loc;
        self.timestamps[index] = written_at;
        Ok(())
    }
}

/// A directory of region files.
#[derive(Debug)]
pub struct RegionFolder {
    root: PathBuf,
    /// Recently used regions. `None` means the region has no file yet.
    open: LruCache<RegionPos, Option<RegionFile>>,
    compression: Compression,
    external_payloads: bool,
}

impl RegionFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: LruCache::new(OPEN_REGIONS),
            compression: Compression::default(),
            external_payloads: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The compression used for records written from now on. Stored records
    /// carry their own compression byte.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Whether records too large for a region file spill into `.mcc` files.
    /// Otherwise writing them fails with [`RegionError::Oversized`].
    pub fn with_external_payloads(mut self, allow: bool) -> Self {
        self.external_payloads = allow;
        self
    }

    fn external_path(&self, pos: ChunkPos) -> PathBuf {
        self.root.join(format!("c.{}.{}.mcc", pos.x, pos.z))
    }

    fn existing(&mut self, pos: RegionPos) -> Result<Option<&mut RegionFile>, RegionError> {
        if !self.open.contains(&pos) {
            let path = self.root.join(pos.file_name());
            let region = match File::options().read(true).write(true).open(path) {
                Ok(file) => Some(RegionFile::open(file)?),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            self.open.put(pos, region);
        }

        Ok(self.open.get_mut(&pos).and_then(Option::as_mut))
    }

    fn existing_or_created(&mut self, pos: RegionPos) -> Result<&mut RegionFile, RegionError> {
        let root = &self.root;
        let slot = self.open.get_or_insert_mut(pos, || None);

        let region = match slot.take() {
            Some(region) => region,
            None => {
                fs::create_dir_all(root)?;
                RegionFile::open_or_create(&root.join(pos.file_name()))?
            }
        };
        Ok(slot.insert(region))
    }

    /// The record stored for the chunk at `pos`, decompressed.
    pub fn read_payload(&mut self, pos: ChunkPos) -> Result<Option<Payload>, RegionError> {
        let frame = match self.existing(RegionPos::of(pos))? {
            Some(region) => region.read_frame(table_index(pos))?,
            None => None,
        };
        let Some(frame) = frame else {
            return Ok(None);
        };

        let compressed = if frame.scheme & EXTERNAL != 0 {
            fs::read(self.external_path(pos))?
        } else {
            frame.body
        };

        let scheme = frame.scheme & !EXTERNAL;
        let compression =
            Compression::from_byte(scheme).ok_or(RegionError::UnknownCompression(scheme))?;

        Ok(Some(Payload {
            bytes: compression.decompress(&compressed)?,
            written_at: frame.written_at,
        }))
    }

    /// Stores `bytes` as the record of the chunk at `pos`, replacing any
    /// earlier one.
    pub fn write_payload(&mut self, pos: ChunkPos, bytes: &[u8]) -> Result<(), RegionError> {
        let compressed = self.compression.compress(bytes)?;
        let scheme = self.compression as u8;
        let external = self.external_path(pos);
        let inline = FRAME_PREFIX + compressed.len() <= MAX_FRAME_SECTORS * SECTOR;

        if !inline && !self.external_payloads {
            return Err(RegionError::Oversized {
                pos,
                len: compressed.len(),
            });
        }

        let region = self.existing_or_created(RegionPos::of(pos))?;
        let index = table_index(pos);

        if inline {
            region.write_frame(index, scheme, &compressed)?;
            remove_if_present(&external)?;
        } else {
            fs::write(&external, &compressed)?;
            region.write_frame(index, scheme | EXTERNAL, &[])?;
        }

        Ok(())
    }

    /// Returns whether a record was removed.
    pub fn delete_payload(&mut self, pos: ChunkPos) -> Result<bool, RegionError> {
        let removed = match self.existing(RegionPos::of(pos))? {
            Some(region) => region.clear(table_index(pos))?,
            None => false,
        };

        if removed {
            remove_if_present(&self.external_path(pos))?;
        }
        Ok(removed)
    }
}
