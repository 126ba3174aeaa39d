use bytemuck::{Pod, Zeroable};
use tracing::{info, warn};

use super::AssetId;
use crate::{
    error::ArchiveErr,
    utils::{ArchiveView, HEADER_SIZE, TABLE_MAGIC},
};

#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableLayout {
    Flat = 0,
    MultiPart = 1,
}

impl TableLayout {
    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(TableLayout::Flat),
            1 => Some(TableLayout::MultiPart),
            _ => None,
        }
    }
}

/// On-disk record of a flat archive. Data lives in the same file.
#[repr(C)]
#[derive(Clone, Copy, Debug, Zeroable, Pod)]
pub struct FlatRecord {
    pub offset: u64,           // absolute file offset, u64::MAX when absent
    pub raw_len: u32,          // stored bytes
    pub decompressed_len: u32, // bytes after decompression
    pub width: u16,
    pub height: u16,
    pub hue: u16,
    pub animation_offset: i8,
    pub flags: u8, // low nibble compression, high nibble encoding
}

/// On-disk record of a multi-part archive. Data lives in data file `file_id`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Zeroable, Pod)]
pub struct PartRecord {
    pub file_id: u16,
    pub block_id: u16,
    pub position: u32, // u32::MAX when absent
    pub length: u32,
    pub decompressed_len: u32,
    pub width: u16,
    pub height: u16,
    pub hue: u16,
    pub flags: u8,
    pub reserved: u8,
}

pub const RECORD_SIZE: usize = 24;

/// Invalid entries padded onto a truncated table at most. A corrupt header
/// can declare billions of records.
pub const MAX_MISSING_RECORDS: usize = 1 << 16;
const _: () = assert!(std::mem::size_of::<FlatRecord>() == RECORD_SIZE);
const _: () = assert!(std::mem::size_of::<PartRecord>() == RECORD_SIZE);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Flat {
        offset: u64,
    },
    Part {
        file_id: u16,
        block_id: u16,
        position: u32,
    },
}

impl Location {
    pub fn file_id(&self) -> usize {
        match self {
            Location::Flat { .. } => 0,
            Location::Part { file_id, .. } => *file_id as usize,
        }
    }

    pub fn position(&self) -> u64 {
        match self {
            Location::Flat { offset } => *offset,
            Location::Part { position, .. } => *position as u64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Zlib,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    RunLength,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub location: Location,
    pub raw_length: u32,
    pub decompressed_length: u32,
    pub width: u16,
    pub height: u16,
    pub hue: u16,
    pub animation_offset: i8,
    pub flags: u8,
}

impl IndexEntry {
    pub const INVALID: IndexEntry = IndexEntry {
        location: Location::Flat { offset: u64::MAX },
        raw_length: 0,
        decompressed_length: 0,
        width: 0,
        height: 0,
        hue: 0,
        animation_offset: 0,
        flags: 0,
    };

    pub fn is_valid(&self) -> bool {
        let sentinel = match self.location {
            Location::Flat { offset } => offset == u64::MAX,
            Location::Part { position, .. } => position == u32::MAX,
        };
        !sentinel && self.raw_length != 0
    }

    pub fn is_animated(&self) -> bool {
        self.animation_offset != 0
    }

    pub fn compression(&self) -> Option<Compression> {
        match self.flags & 0x0F {
            0 => Some(Compression::Stored),
            1 => Some(Compression::Zlib),
            _ => None,
        }
    }

    pub fn encoding(&self) -> Option<Encoding> {
        match self.flags >> 4 {
            0 => Some(Encoding::Raw),
            1 => Some(Encoding::RunLength),
            _ => None,
        }
    }

    fn from_flat(r: &FlatRecord) -> Self {
        Self {
            location: Location::Flat { offset: r.offset },
            raw_length: r.raw_len,
            decompressed_length: r.decompressed_len,
            width: r.width,
            height: r.height,
            hue: r.hue,
            animation_offset: r.animation_offset,
            flags: r.flags,
        }
    }

    fn from_part(r: &PartRecord) -> Self {
        Self {
            location: Location::Part {
                file_id: r.file_id,
                block_id: r.block_id,
                position: r.position,
            },
            raw_length: r.length,
            decompressed_length: r.decompressed_len,
            width: r.width,
            height: r.height,
            hue: r.hue,
            animation_offset: 0,
            flags: r.flags,
        }
    }
}

////////////////////////////////////////////////
/// AssetIndex
/// * Ordered per-asset metadata parsed once from an archive's header table.
/// * Position in the table is the asset id. Ids out of range and sentinel
///   records both resolve to "no asset".
////////////////////////////////////////////////
#[derive(Debug, Clone)]
pub struct AssetIndex {
    layout: TableLayout,
    entries: Vec<IndexEntry>,
}

impl AssetIndex {
    pub fn empty() -> Self {
        Self {
            layout: TableLayout::Flat,
            entries: Vec::new(),
        }
    }

    /// Parses the header table of `table`. `parts` are the data files of a
    /// multi-part archive and are ignored for flat archives, whose data lives
    /// in `table` itself.
    pub fn load(table: &ArchiveView, parts: &[ArchiveView]) -> Result<Self, ArchiveErr> {
        let hdr = table.header(TABLE_MAGIC)?;
        let layout = TableLayout::from_raw(hdr.layout).ok_or(ArchiveErr::BadHeader)?;

        let declared = hdr.entry_count as usize;
        let available = table.records_available(RECORD_SIZE).min(declared);
        let kept = declared.min(available.saturating_add(MAX_MISSING_RECORDS));
        if available < declared {
            warn!(
                resource = "index",
                path = %table.path().display(),
                declared,
                available,
                kept,
                "index table truncated, missing records are invalid"
            );
        }

        let mut entries = Vec::with_capacity(kept);
        let mut out_of_bounds = 0usize;
        for i in 0..available {
            let offset = (HEADER_SIZE + i * RECORD_SIZE) as u64;
            let entry = match layout {
                TableLayout::Flat => IndexEntry::from_flat(&table.read_pod::<FlatRecord>(offset)?),
                TableLayout::MultiPart => {
                    IndexEntry::from_part(&table.read_pod::<PartRecord>(offset)?)
                }
            };

            let data_len = match layout {
                TableLayout::Flat => Some(table.len()),
                TableLayout::MultiPart => parts.get(entry.location.file_id()).map(ArchiveView::len),
            };

            if entry.is_valid() && !fits(&entry, data_len) {
                out_of_bounds += 1;
                entries.push(IndexEntry::INVALID);
            } else {
                entries.push(entry);
            }
        }
        entries.resize(kept, IndexEntry::INVALID);

        if out_of_bounds > 0 {
            warn!(
                resource = "index",
                path = %table.path().display(),
                out_of_bounds,
                "records point outside their data file and were marked invalid"
            );
        }

        info!(
            resource = "index",
            path = %table.path().display(),
            entries = entries.len(),
            layout = ?layout
        );

        Ok(Self { layout, entries })
    }

    pub fn layout(&self) -> TableLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry for `id` unless it is out of range or invalid.
    pub fn get(&self, id: AssetId) -> Option<&IndexEntry> {
        self.entries
            .get(id as usize)
            .filter(|entry| entry.is_valid())
    }

    /// Returns the stored entry, sentinel records included.
    pub fn entry(&self, id: AssetId) -> Option<&IndexEntry> {
        self.entries.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetId, &IndexEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(id, entry)| (id as AssetId, entry))
    }

    /// Resolves frame `frame` of an animated entry by stepping its animation
    /// offset. Non-animated entries only resolve frame 0.
    pub fn frame(&self, id: AssetId, frame: u32) -> Option<AssetId> {
        let entry = self.get(id)?;
        if frame == 0 {
            return Some(id);
        }
        if !entry.is_animated() {
            return None;
        }

        let target = id as i64 + entry.animation_offset as i64 * frame as i64;
        let target = AssetId::try_from(target).ok()?;
        self.get(target).map(|_| target)
    }
}

fn fits(entry: &IndexEntry, data_len: Option<usize>) -> bool {
    let Some(data_len) = data_len else {
        return false;
    };
    entry
        .location
        .position()
        .checked_add(entry.raw_length as u64)
        .is_some_and(|end| end <= data_len as u64)
}
