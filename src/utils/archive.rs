use bytemuck::{Pod, Zeroable};
use memmap2::Mmap;
use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::warn;

use crate::error::ArchiveErr;

pub const TABLE_MAGIC: [u8; 4] = *b"KURA";
pub const HUE_MAGIC: [u8; 4] = *b"HUES";
pub const VERSION: u16 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Zeroable, Pod)]
pub struct TableHeader {
    pub magic: [u8; 4],   // "KURA" / "HUES"
    pub version: u16,     // 1
    pub layout: u16,      // table layout, reserved for hue files
    pub entry_count: u32, // number of fixed-size records that follow
}

pub const HEADER_SIZE: usize = std::mem::size_of::<TableHeader>();

////////////////////////////////////////////////
/// ArchiveView
/// * Read-only, memory-mapped window over one archive file.
/// * Cloning shares the mapping; reads never move a cursor, so views can be
///   handed to worker threads and read concurrently.
/// * An empty view stands in for a missing archive. Every read against it is
///   out of range, which callers treat as a miss.
////////////////////////////////////////////////
#[derive(Clone, Debug)]
pub struct ArchiveView {
    path: PathBuf,
    map: Option<Arc<Mmap>>,
}

impl ArchiveView {
    /// Maps the file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveErr> {
        let path = path.as_ref();
        let f = File::open(path)?;
        let len = f.metadata()?.len();

        // Zero-length files cannot be mapped on every platform.
        let map = if len == 0 {
            None
        } else {
            Some(Arc::new(unsafe { Mmap::map(&f)? }))
        };

        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    /// Maps the file at `path`, or returns an empty view when it is missing or
    /// unreadable. The failure is logged once here.
    pub fn open_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(view) => view,
            Err(err) => {
                warn!(resource = "archive", path = %path.display(), error = %err, "archive unavailable, all lookups will miss");
                Self::empty(path)
            }
        }
    }

    pub fn empty(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            map: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map.as_ref().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows `len` bytes starting at `offset`.
    pub fn read(&self, offset: u64, len: u64) -> Result<&[u8], ArchiveErr> {
        let bytes: &[u8] = self.map.as_deref().map(|m| &m[..]).unwrap_or(&[]);
        let out_of_range = || ArchiveErr::OutOfRange {
            offset,
            len,
            size: bytes.len(),
        };

        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .ok_or_else(out_of_range)?;

        bytes.get(start..end).ok_or_else(out_of_range)
    }

    /// Reads one plain-old-data record at `offset`.
    pub fn read_pod<T: Pod>(&self, offset: u64) -> Result<T, ArchiveErr> {
        let bytes = self.read(offset, std::mem::size_of::<T>() as u64)?;
        Ok(bytemuck::pod_read_unaligned::<T>(bytes))
    }

    /// Validates and returns the table header at the start of the file.
    pub fn header(&self, magic: [u8; 4]) -> Result<TableHeader, ArchiveErr> {
        if self.len() < HEADER_SIZE {
            return Err(ArchiveErr::Truncated {
                needed: HEADER_SIZE,
                actual: self.len(),
            });
        }

        let hdr: TableHeader = self.read_pod(0)?;
        if hdr.magic != magic || hdr.version != VERSION {
            return Err(ArchiveErr::BadHeader);
        }

        Ok(hdr)
    }

    /// Number of whole `record_size` records stored after the header.
    pub fn records_available(&self, record_size: usize) -> usize {
        self.len().saturating_sub(HEADER_SIZE) / record_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp archive");
        file.write_all(bytes).expect("write temp archive");
        file.flush().expect("flush temp archive");
        file
    }

    #[test]
    fn reads_byte_ranges() {
        let file = write_temp(&[1, 2, 3, 4, 5, 6]);
        let view = ArchiveView::open(file.path()).expect("open archive");

        assert_eq!(view.len(), 6);
        assert_eq!(view.read(2, 3).expect("read inside"), &[3, 4, 5]);
        assert_eq!(view.read(6, 0).expect("empty read at end"), &[] as &[u8]);
        assert!(matches!(
            view.read(4, 3),
            Err(ArchiveErr::OutOfRange { size: 6, .. })
        ));
        assert!(view.read(u64::MAX, 2).is_err());
    }

    #[test]
    fn missing_archive_is_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("absent.mul");

        assert!(matches!(ArchiveView::open(&path), Err(ArchiveErr::NotFound)));

        let view = ArchiveView::open_or_empty(&path);
        assert!(view.is_empty());
        assert!(view.read(0, 1).is_err());
    }

    #[test]
    fn empty_file_maps_to_empty_view() {
        let file = write_temp(&[]);
        let view = ArchiveView::open(file.path()).expect("open empty archive");
        assert!(view.is_empty());
        assert!(matches!(
            view.header(TABLE_MAGIC),
            Err(ArchiveErr::Truncated { actual: 0, .. })
        ));
    }

    #[test]
    fn header_checks_magic_and_version() {
        let hdr = TableHeader {
            magic: TABLE_MAGIC,
            version: VERSION,
            layout: 0,
            entry_count: 3,
        };
        let file = write_temp(bytemuck::bytes_of(&hdr));
        let view = ArchiveView::open(file.path()).expect("open archive");

        assert_eq!(view.header(TABLE_MAGIC).expect("valid header").entry_count, 3);
        assert!(matches!(view.header(HUE_MAGIC), Err(ArchiveErr::BadHeader)));
    }

    #[test]
    fn clones_read_concurrently() {
        let data: Vec<u8> = (0..=255u8).collect();
        let file = write_temp(&data);
        let view = ArchiveView::open(file.path()).expect("open archive");

        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let view = view.clone();
                std::thread::spawn(move || view.read(i * 64, 64).map(|b| b[0]).ok())
            })
            .collect();

        let firsts: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("reader thread"))
            .collect();
        assert_eq!(firsts, vec![Some(0), Some(64), Some(128), Some(192)]);
    }
}
