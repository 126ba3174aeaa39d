#![allow(dead_code)]

use std::io::Write;

use flate2::{Compression, write::ZlibEncoder};
use kura::{FlatRecord, HEADER_SIZE, HUE_MAGIC, HueRecord, PartRecord, RECORD_SIZE, TABLE_MAGIC, TableHeader, VERSION};

pub const RED: u16 = 0x7C00;
pub const BLUE: u16 = 0x001F;
pub const WHITE: u16 = 0x7FFF;

pub enum Sprite {
    Raw { width: u16, height: u16, samples: Vec<u16> },
    Zlib { width: u16, height: u16, samples: Vec<u16> },
    Hued { width: u16, height: u16, hue: u16, samples: Vec<u16> },
    Animated { width: u16, height: u16, offset: i8, samples: Vec<u16> },
    Corrupt { width: u16, height: u16 },
    Invalid,
}

impl Sprite {
    pub fn solid(width: u16, height: u16, color: u16) -> Self {
        Sprite::Raw {
            width,
            height,
            samples: vec![color; width as usize * height as usize],
        }
    }
}

struct Encoded {
    blob: Vec<u8>,
    decompressed: u32,
    width: u16,
    height: u16,
    hue: u16,
    animation_offset: i8,
    flags: u8,
}

fn samples(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn zlib(bytes: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).expect("zlib write");
    enc.finish().expect("zlib finish")
}

fn encode(sprite: &Sprite) -> Option<Encoded> {
    let stored = |width, height, hue, animation_offset, data: &[u16]| {
        let blob = samples(data);
        Encoded {
            decompressed: blob.len() as u32,
            blob,
            width,
            height,
            hue,
            animation_offset,
            flags: 0x00,
        }
    };

    Some(match sprite {
        Sprite::Raw {
            width,
            height,
            samples,
        } => stored(*width, *height, 0, 0, samples.as_slice()),
        Sprite::Hued {
            width,
            height,
            hue,
            samples,
        } => stored(*width, *height, *hue, 0, samples.as_slice()),
        Sprite::Animated {
            width,
            height,
            offset,
            samples,
        } => stored(*width, *height, 0, *offset, samples.as_slice()),
        Sprite::Zlib {
            width,
            height,
            samples: data,
        } => {
            let bytes = samples(data);
            Encoded {
                decompressed: bytes.len() as u32,
                blob: zlib(&bytes),
                width: *width,
                height: *height,
                hue: 0,
                animation_offset: 0,
                flags: 0x01,
            }
        }
        Sprite::Corrupt { width, height } => Encoded {
            blob: vec![0xBA, 0xAD, 0xF0, 0x0D],
            decompressed: *width as u32 * *height as u32 * 2,
            width: *width,
            height: *height,
            hue: 0,
            animation_offset: 0,
            flags: 0x01,
        },
        Sprite::Invalid => return None,
    })
}

fn header(layout: u16, count: usize) -> Vec<u8> {
    let hdr = TableHeader {
        magic: TABLE_MAGIC,
        version: VERSION,
        layout,
        entry_count: count as u32,
    };
    bytemuck::bytes_of(&hdr).to_vec()
}

/// Single-file archive: header, records, then every payload.
pub fn flat_archive(sprites: &[Sprite]) -> Vec<u8> {
    let mut out = header(0, sprites.len());
    let mut data = Vec::new();
    let data_start = (HEADER_SIZE + sprites.len() * RECORD_SIZE) as u64;

    for sprite in sprites {
        let record = match encode(sprite) {
            Some(e) => {
                let record = FlatRecord {
                    offset: data_start + data.len() as u64,
                    raw_len: e.blob.len() as u32,
                    decompressed_len: e.decompressed,
                    width: e.width,
                    height: e.height,
                    hue: e.hue,
                    animation_offset: e.animation_offset,
                    flags: e.flags,
                };
                data.extend_from_slice(&e.blob);
                record
            }
            None => FlatRecord {
                offset: u64::MAX,
                raw_len: 0,
                decompressed_len: 0,
                width: 0,
                height: 0,
                hue: 0,
                animation_offset: 0,
                flags: 0,
            },
        };
        out.extend_from_slice(bytemuck::bytes_of(&record));
    }

    out.extend_from_slice(&data);
    out
}

/// Multi-part archive with every payload in data file 0. Returns the table
/// and the data file.
pub fn multipart_archive(sprites: &[Sprite]) -> (Vec<u8>, Vec<u8>) {
    let mut table = header(1, sprites.len());
    let mut data = Vec::new();

    for (block, sprite) in sprites.iter().enumerate() {
        let record = match encode(sprite) {
            Some(e) => {
                let record = PartRecord {
                    file_id: 0,
                    block_id: block as u16,
                    position: data.len() as u32,
                    length: e.blob.len() as u32,
                    decompressed_len: e.decompressed,
                    width: e.width,
                    height: e.height,
                    hue: e.hue,
                    flags: e.flags,
                    reserved: 0,
                };
                data.extend_from_slice(&e.blob);
                record
            }
            None => PartRecord {
                file_id: 0,
                block_id: block as u16,
                position: u32::MAX,
                length: 0,
                decompressed_len: 0,
                width: 0,
                height: 0,
                hue: 0,
                flags: 0,
                reserved: 0,
            },
        };
        table.extend_from_slice(bytemuck::bytes_of(&record));
    }

    (table, data)
}

pub fn hue_table(records: &[HueRecord]) -> Vec<u8> {
    let hdr = TableHeader {
        magic: HUE_MAGIC,
        version: VERSION,
        layout: 0,
        entry_count: records.len() as u32,
    };
    let mut out = bytemuck::bytes_of(&hdr).to_vec();
    for record in records {
        out.extend_from_slice(bytemuck::bytes_of(record));
    }
    out
}

/// Temporary base directory for a store.
pub struct StoreDir {
    dir: tempfile::TempDir,
}

impl StoreDir {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create store dir"),
        }
    }

    pub fn base(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    pub fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> String {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, bytes).expect("write store file");
        path.to_string_lossy().into_owned()
    }

    pub fn layout(&self, json: &str) -> String {
        self.write("layout.json", json.as_bytes())
    }
}
