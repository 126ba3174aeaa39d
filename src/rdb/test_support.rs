//! Builds small archive tables in memory for unit tests.

use std::io::Write;

use flate2::{Compression, write::ZlibEncoder};

use super::{FlatRecord, PartRecord, RECORD_SIZE};
use crate::utils::{HEADER_SIZE, TABLE_MAGIC, TableHeader, VERSION};

pub fn write_file(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp archive");
    file.write_all(bytes).expect("write temp archive");
    file.flush().expect("flush temp archive");
    file
}

pub fn sample_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

pub fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).expect("zlib write");
    enc.finish().expect("zlib finish")
}

pub fn run_length(width: u16, samples: &[u16]) -> Vec<u8> {
    let mut words = Vec::new();
    for row in samples.chunks(width as usize) {
        let mut runs: Vec<(u16, u16)> = Vec::new();
        for &s in row {
            match runs.last_mut() {
                Some((color, len)) if *color == s => *len += 1,
                _ => runs.push((s, 1)),
            }
        }
        words.push(runs.len() as u16);
        for (color, len) in runs {
            words.push(color);
            words.push(len);
        }
    }
    sample_bytes(&words)
}

enum Pending {
    Flat { record: FlatRecord, relocate: bool },
    Part(PartRecord),
}

pub struct TableBuilder {
    layout: u16,
    records: Vec<Pending>,
    data: Vec<u8>,
}

impl TableBuilder {
    pub fn flat() -> Self {
        Self {
            layout: 0,
            records: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn multipart() -> Self {
        Self {
            layout: 1,
            ..Self::flat()
        }
    }

    fn push_blob(&mut self, blob: &[u8], decompressed: usize, width: u16, height: u16, hue: u16, flags: u8) {
        let record = FlatRecord {
            offset: self.data.len() as u64,
            raw_len: blob.len() as u32,
            decompressed_len: decompressed as u32,
            width,
            height,
            hue,
            animation_offset: 0,
            flags,
        };
        self.data.extend_from_slice(blob);
        self.records.push(Pending::Flat {
            record,
            relocate: true,
        });
    }

    pub fn raw_sprite(&mut self, width: u16, height: u16, samples: &[u16]) {
        self.hued_sprite(width, height, 0, samples);
    }

    pub fn hued_sprite(&mut self, width: u16, height: u16, hue: u16, samples: &[u16]) {
        let bytes = sample_bytes(samples);
        self.push_blob(&bytes, bytes.len(), width, height, hue, 0x00);
    }

    pub fn zlib_sprite(&mut self, width: u16, height: u16, samples: &[u16]) {
        let bytes = sample_bytes(samples);
        self.push_blob(&zlib(&bytes), bytes.len(), width, height, 0, 0x01);
    }

    pub fn rle_sprite(&mut self, width: u16, height: u16, samples: &[u16]) {
        let bytes = run_length(width, samples);
        self.push_blob(&bytes, bytes.len(), width, height, 0, 0x10);
    }

    /// Stores the dimensions in the payload instead of the record.
    pub fn sized_payload_sprite(&mut self, width: u16, height: u16, samples: &[u16]) {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend(sample_bytes(samples));
        self.push_blob(&bytes, bytes.len(), 0, 0, 0, 0x00);
    }

    /// A zlib record whose stream is garbage.
    pub fn corrupt_zlib_sprite(&mut self, width: u16, height: u16) {
        let garbage = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x11];
        self.push_blob(&garbage, width as usize * height as usize * 2, width, height, 0, 0x01);
    }

    pub fn invalid(&mut self) {
        self.record(FlatRecord {
            offset: u64::MAX,
            raw_len: 0,
            decompressed_len: 0,
            width: 0,
            height: 0,
            hue: 0,
            animation_offset: 0,
            flags: 0,
        });
    }

    /// Adds a flat record verbatim; its offset is not relocated.
    pub fn record(&mut self, record: FlatRecord) {
        self.records.push(Pending::Flat {
            record,
            relocate: false,
        });
    }

    pub fn part(&mut self, record: PartRecord) {
        self.records.push(Pending::Part(record));
    }

    pub fn finish(self) -> Vec<u8> {
        let hdr = TableHeader {
            magic: TABLE_MAGIC,
            version: VERSION,
            layout: self.layout,
            entry_count: self.records.len() as u32,
        };
        let data_start = (HEADER_SIZE + self.records.len() * RECORD_SIZE) as u64;

        let mut out = bytemuck::bytes_of(&hdr).to_vec();
        for pending in &self.records {
            match pending {
                Pending::Flat { record, relocate } => {
                    let mut record = *record;
                    if *relocate {
                        record.offset += data_start;
                    }
                    out.extend_from_slice(bytemuck::bytes_of(&record));
                }
                Pending::Part(record) => out.extend_from_slice(bytemuck::bytes_of(record)),
            }
        }
        out.extend_from_slice(&self.data);
        out
    }
}
