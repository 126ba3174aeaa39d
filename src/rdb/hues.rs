use tracing::debug;

use crate::{
    error::ArchiveErr,
    utils::{ArchiveView, HEADER_SIZE, HUE_MAGIC},
};

pub const HUE_COLORS: usize = 32;
pub const PARTIAL_HUE: u16 = 0x8000;
const HUE_ID_MASK: u16 = 0x3FFF;

pub type HueRecord = [u16; HUE_COLORS];

/// Recolor tables indexed by 1-based hue id. Each table maps the 5-bit red
/// channel of a source pixel onto a replacement ARGB1555 color.
#[derive(Debug, Clone, Default)]
pub struct HueTable {
    hues: Vec<HueRecord>,
}

impl HueTable {
    pub fn new(hues: Vec<HueRecord>) -> Self {
        Self { hues }
    }

    pub fn load(view: &ArchiveView) -> Result<Self, ArchiveErr> {
        let hdr = view.header(HUE_MAGIC)?;
        let record_size = std::mem::size_of::<HueRecord>();
        let count = hdr.entry_count as usize;
        let available = view.records_available(record_size);
        if available < count {
            return Err(ArchiveErr::Truncated {
                needed: HEADER_SIZE + count * record_size,
                actual: view.len(),
            });
        }

        let hues = (0..count)
            .map(|i| view.read_pod::<HueRecord>((HEADER_SIZE + i * record_size) as u64))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { hues })
    }

    pub fn len(&self) -> usize {
        self.hues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hues.is_empty()
    }

    pub fn record(&self, hue: u16) -> Option<&HueRecord> {
        let id = (hue & HUE_ID_MASK) as usize;
        id.checked_sub(1).and_then(|i| self.hues.get(i))
    }

    /// Recolors `samples` in place. Transparent samples are left untouched.
    /// Returns `false` when `hue` names no table.
    pub fn apply(&self, hue: u16, samples: &mut [u16]) -> bool {
        let Some(record) = self.record(hue) else {
            debug!(resource = "hue", hue, "unknown hue, skipping recolor");
            return false;
        };
        let partial = hue & PARTIAL_HUE != 0;

        for sample in samples.iter_mut().filter(|s| **s != 0) {
            let r = (*sample >> 10) & 0x1F;
            let g = (*sample >> 5) & 0x1F;
            let b = *sample & 0x1F;
            if partial && !(r == g && g == b) {
                continue;
            }

            // A replacement of 0 would read as the color key.
            *sample = match record[r as usize] & 0x7FFF {
                0 => 0x0001,
                color => color,
            };
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> HueRecord {
        std::array::from_fn(|i| (i as u16) << 5)
    }

    #[test]
    fn full_hue_maps_red_channel() {
        let table = HueTable::new(vec![ramp()]);
        // r = 31, g = 0, b = 0 and a grey r = g = b = 4.
        let mut samples = [0x7C00, 0x0000, (4 << 10) | (4 << 5) | 4];

        assert!(table.apply(1, &mut samples));
        assert_eq!(samples, [31 << 5, 0x0000, 4 << 5]);
    }

    #[test]
    fn partial_hue_only_touches_grey() {
        let table = HueTable::new(vec![ramp()]);
        let grey = (4 << 10) | (4 << 5) | 4;
        let mut samples = [0x7C00, grey];

        assert!(table.apply(1 | PARTIAL_HUE, &mut samples));
        assert_eq!(samples, [0x7C00, 4 << 5]);
    }

    #[test]
    fn unknown_hue_is_a_no_op() {
        let table = HueTable::new(vec![ramp()]);
        let mut samples = [0x7C00];
        assert!(!table.apply(2, &mut samples));
        assert!(!table.apply(0, &mut samples));
        assert_eq!(samples, [0x7C00]);
    }

    #[test]
    fn black_replacement_stays_visible() {
        let table = HueTable::new(vec![[0u16; HUE_COLORS]]);
        let mut samples = [0x7FFF];
        table.apply(1, &mut samples);
        assert_ne!(samples[0], 0);
    }
}
