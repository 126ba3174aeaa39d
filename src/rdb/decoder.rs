use std::{
    borrow::Cow,
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use flate2::read::ZlibDecoder;

/// Deflate cannot expand input by more than this factor.
const MAX_INFLATE_RATIO: usize = 1032;

use super::{AssetId, Compression, Encoding, HueTable, IndexEntry};
use crate::{error::KuraError, utils::ArchiveView};

/// Decoded RGBA8 pixels of one sprite. Lives only until the atlas insert
/// that consumes it completes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps tightly packed RGBA8 rows. Returns `None` if the length does not
    /// match the dimensions.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(4)?;
        (rgba.len() == expected).then_some(Self {
            width,
            height,
            rgba,
        })
    }

    /// Expands ARGB1555 samples. `0x0000` is the transparent color key; every
    /// other sample is opaque.
    pub fn from_argb1555(width: u32, height: u32, samples: &[u16]) -> Self {
        let widen = |c: u16| ((c << 3) | (c >> 2)) as u8;
        let mut rgba = Vec::with_capacity(samples.len() * 4);
        for &s in samples {
            if s == 0 {
                rgba.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                rgba.extend_from_slice(&[
                    widen((s >> 10) & 0x1F),
                    widen((s >> 5) & 0x1F),
                    widen(s & 0x1F),
                    0xFF,
                ]);
            }
        }

        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn alpha(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4 + 3;
        self.rgba.get(idx).copied()
    }
}

////////////////////////////////////////////////
/// Decoder
/// * Turns index entries into pixel buffers by reading the record from its
///   archive view, inflating it and unpacking the samples.
/// * Holds no mutable state besides a call counter, so one decoder can be
///   shared across worker threads.
////////////////////////////////////////////////
#[derive(Debug)]
pub struct Decoder {
    sources: Vec<ArchiveView>,
    hues: Option<Arc<HueTable>>,
    decodes: AtomicU64,
}

impl Decoder {
    /// `sources[0]` backs flat entries; multi-part entries select their data
    /// file by `file_id`.
    pub fn new(sources: Vec<ArchiveView>, hues: Option<Arc<HueTable>>) -> Self {
        Self {
            sources,
            hues,
            decodes: AtomicU64::new(0),
        }
    }

    /// Total number of `decode` calls made through this decoder.
    pub fn decode_count(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }

    pub fn decode(&self, id: AssetId, entry: &IndexEntry) -> Result<PixelBuffer, KuraError> {
        self.decodes.fetch_add(1, Ordering::Relaxed);

        if !entry.is_valid() {
            return Err(KuraError::InvalidAssetId(id));
        }

        let unsupported = || KuraError::UnsupportedFormat {
            id,
            flags: entry.flags,
        };
        let compression = entry.compression().ok_or_else(unsupported)?;
        let encoding = entry.encoding().ok_or_else(unsupported)?;

        let source = self
            .sources
            .get(entry.location.file_id())
            .ok_or_else(|| KuraError::corrupt(id, "record names a missing data file"))?;
        let raw = source
            .read(entry.location.position(), entry.raw_length as u64)
            .map_err(|err| KuraError::corrupt(id, err.to_string()))?;

        let payload = inflate(id, entry, compression, raw)?;

        let (width, height, body) = if entry.width == 0 || entry.height == 0 {
            if payload.len() < 4 {
                return Err(KuraError::corrupt(id, "payload too short for dimensions"));
            }
            let w = u16::from_le_bytes([payload[0], payload[1]]);
            let h = u16::from_le_bytes([payload[2], payload[3]]);
            (w, h, &payload[4..])
        } else {
            (entry.width, entry.height, &payload[..])
        };
        if width == 0 || height == 0 {
            return Err(KuraError::corrupt(id, "zero-sized sprite"));
        }

        let mut samples = match encoding {
            Encoding::Raw => unpack_raw(id, width, height, body)?,
            Encoding::RunLength => unpack_runs(id, width, height, body)?,
        };

        if entry.hue != 0 {
            if let Some(hues) = &self.hues {
                hues.apply(entry.hue, &mut samples);
            }
        }

        Ok(PixelBuffer::from_argb1555(
            width as u32,
            height as u32,
            &samples,
        ))
    }
}

fn inflate<'a>(
    id: AssetId,
    entry: &IndexEntry,
    compression: Compression,
    raw: &'a [u8],
) -> Result<Cow<'a, [u8]>, KuraError> {
    let expected = entry.decompressed_length as usize;
    match compression {
        Compression::Stored => {
            if raw.len() != expected {
                return Err(KuraError::corrupt(
                    id,
                    format!("stored record is {} bytes, expected {expected}", raw.len()),
                ));
            }
            Ok(Cow::Borrowed(raw))
        }
        Compression::Zlib => {
            let mut out = Vec::with_capacity(expected.min(raw.len().saturating_mul(MAX_INFLATE_RATIO)));
            // One extra byte is enough to detect an oversized stream.
            ZlibDecoder::new(raw)
                .take(expected as u64 + 1)
                .read_to_end(&mut out)
                .map_err(|err| KuraError::corrupt(id, format!("zlib: {err}")))?;
            if out.len() != expected {
                return Err(KuraError::corrupt(
                    id,
                    format!("inflated to {} bytes, expected {expected}", out.len()),
                ));
            }
            Ok(Cow::Owned(out))
        }
    }
}

fn unpack_raw(id: AssetId, width: u16, height: u16, body: &[u8]) -> Result<Vec<u16>, KuraError> {
    let count = width as usize * height as usize;
    if body.len() != count * 2 {
        return Err(KuraError::corrupt(
            id,
            format!("{} sample bytes for a {width}x{height} sprite", body.len()),
        ));
    }

    Ok(body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

fn unpack_runs(id: AssetId, width: u16, height: u16, body: &[u8]) -> Result<Vec<u16>, KuraError> {
    let short = || KuraError::corrupt(id, "run-length data ends early");
    let mut words = body
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]));
    // Every row carries at least a run count, and one run covers at most
    // u16::MAX pixels, so the body bounds the output before any run is read.
    if height as usize * 2 > body.len() {
        return Err(short());
    }
    let bound = (body.len() / 4).saturating_mul(u16::MAX as usize);
    let mut samples = Vec::with_capacity((width as usize * height as usize).min(bound));

    for row in 0..height {
        let runs = words.next().ok_or_else(short)?;
        let mut filled = 0usize;
        for _ in 0..runs {
            let color = words.next().ok_or_else(short)?;
            let len = words.next().ok_or_else(short)? as usize;
            filled += len;
            if filled > width as usize {
                return Err(KuraError::corrupt(id, format!("row {row} overruns width")));
            }
            samples.extend(std::iter::repeat_n(color, len));
        }
        if filled != width as usize {
            return Err(KuraError::corrupt(id, format!("row {row} underruns width")));
        }
    }

    if words.next().is_some() || body.len() % 2 != 0 {
        return Err(KuraError::corrupt(id, "trailing bytes after run-length rows"));
    }

    Ok(samples)
}
