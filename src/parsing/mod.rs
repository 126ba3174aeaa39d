use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_hue_path() -> Option<String> {
    Some("hues.mul".to_string())
}

fn default_max_dimension() -> u32 {
    2048
}

fn default_max_pages() -> usize {
    4
}

fn default_padding() -> u32 {
    1
}

fn default_alpha_threshold() -> u8 {
    1
}

fn default_families() -> HashMap<String, FamilyLayout> {
    HashMap::from([(
        "art".to_string(),
        FamilyLayout {
            table: "art.mul".to_string(),
            ..Default::default()
        },
    )])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreLayoutFile {
    /// Hue table shared by every family. `null` disables recoloring.
    #[serde(default = "default_hue_path")]
    pub hues: Option<String>,
    #[serde(default = "default_families")]
    pub families: HashMap<String, FamilyLayout>,
    #[serde(default)]
    pub atlas: AtlasConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FamilyLayout {
    /// Index table. Flat archives also hold their data here.
    #[serde(default)]
    pub table: String,
    /// Data files of a multi-part archive, in `file_id` order.
    #[serde(default)]
    pub data: Vec<String>,
    /// Directory of `<id>.png` replacement images.
    #[serde(default)]
    pub overrides: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Edge length of every atlas surface, in pixels.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// Surfaces a cache may create before inserts report capacity exceeded.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Gap left right of and below each sprite.
    #[serde(default = "default_padding")]
    pub padding: u32,
    /// Minimum alpha counted as opaque by hit testing.
    #[serde(default = "default_alpha_threshold")]
    pub alpha_threshold: u8,
}

/// Largest surface edge most GPUs accept.
pub const MAX_ATLAS_DIMENSION: u32 = 16384;
pub const MAX_ATLAS_PAGES: usize = 64;

impl AtlasConfig {
    /// Brings every field into a range the atlas can allocate. Layout files
    /// are external input.
    pub fn clamped(self) -> Self {
        let max_dimension = self.max_dimension.clamp(1, MAX_ATLAS_DIMENSION);
        Self {
            max_dimension,
            max_pages: self.max_pages.clamp(1, MAX_ATLAS_PAGES),
            padding: self.padding.min(max_dimension),
            alpha_threshold: self.alpha_threshold,
        }
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            max_pages: default_max_pages(),
            padding: default_padding(),
            alpha_threshold: default_alpha_threshold(),
        }
    }
}

impl Default for StoreLayoutFile {
    fn default() -> Self {
        Self {
            hues: default_hue_path(),
            families: default_families(),
            atlas: AtlasConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_bounds_every_field() {
        let layout: StoreLayoutFile = serde_json::from_str(
            r#"{ "atlas": { "max_dimension": 100000, "max_pages": 0, "padding": 4294967295 } }"#,
        )
        .expect("parse hostile layout");

        let config = layout.atlas.clamped();
        assert_eq!(config.max_dimension, MAX_ATLAS_DIMENSION);
        assert_eq!(config.max_pages, 1);
        assert_eq!(config.padding, MAX_ATLAS_DIMENSION);
        assert_eq!(AtlasConfig::default().clamped(), AtlasConfig::default());
    }

    #[test]
    fn empty_layout_uses_defaults() {
        let layout: StoreLayoutFile = serde_json::from_str("{}").expect("parse empty layout");
        assert_eq!(layout.hues.as_deref(), Some("hues.mul"));
        assert_eq!(layout.families["art"].table, "art.mul");
        assert_eq!(layout.atlas, AtlasConfig::default());
    }

    #[test]
    fn partial_atlas_config_fills_defaults() {
        let layout: StoreLayoutFile = serde_json::from_str(
            r#"{
                "hues": null,
                "families": {
                    "gumps": { "table": "gumps.idx", "data": ["gumps_0.mul"], "overrides": "packs/gumps" }
                },
                "atlas": { "max_dimension": 512 }
            }"#,
        )
        .expect("parse layout");

        assert!(layout.hues.is_none());
        let gumps = &layout.families["gumps"];
        assert_eq!(gumps.data, vec!["gumps_0.mul".to_string()]);
        assert_eq!(gumps.overrides.as_deref(), Some("packs/gumps"));
        assert_eq!(layout.atlas.max_dimension, 512);
        assert_eq!(layout.atlas.max_pages, 4);
    }
}
