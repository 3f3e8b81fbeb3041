use crate::config::ObjectSize;
use crate::geometry::ShelfLineSpec;
use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A foreground cutout resolved from `foregrounds.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForegroundDescriptor {
    pub category: String,
    pub label: String,
    pub native_width: u32,
    pub native_height: u32,
    /// RGBA cutout (`templates/foregrounds/<category>/<label>.png`).
    pub file: PathBuf,
}

/// A background template resolved from `backgrounds.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackgroundDescriptor {
    pub label: String,
    /// Background photo (`templates/backgrounds/<label>.jpg`).
    pub file: PathBuf,
    /// Boundary lines, top to bottom.
    pub lines: Vec<ShelfLineSpec>,
}

/// One object placed on a shelf region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacedInstance {
    /// Top-left corner on the canvas; may be negative when the object pokes out of the image.
    pub x: i64,
    pub y: i64,
    /// Placed size (post-rotation bounding box).
    pub width: u32,
    pub height: u32,
    /// Rotation in degrees (counter-clockwise), if the instance was rotated.
    pub rotation: Option<f64>,
    pub size: ObjectSize,
    pub category: String,
    pub label: String,
    /// Resolved from the class map for annotated categories only.
    pub class_id: Option<u32>,
    /// False for no-mask categories.
    pub has_mask: bool,
}

/// Output of filling one shelf region.
#[derive(Debug)]
pub struct RegionResult {
    pub shelf_index: usize,
    /// Background with this region's objects composited on top.
    pub image: RgbaImage,
    /// Union of every instance alpha placed in this region.
    pub mask: GrayImage,
    pub instances: Vec<PlacedInstance>,
    pub mask_files: Vec<PathBuf>,
}

/// One persisted image of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub index: usize,
    pub name: String,
    pub background: String,
    pub image_path: PathBuf,
    pub mask_paths: Vec<PathBuf>,
    /// Placeable regions that were left empty.
    pub skipped_regions: Vec<usize>,
    pub instances: Vec<PlacedInstance>,
}

/// A dataset directory written by one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub path: PathBuf,
    pub stamp: String,
    pub id_class_map: BTreeMap<u32, String>,
    pub images: Vec<GeneratedImage>,
}

/// Summary numbers for a dataset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DatasetStats {
    pub num_images: usize,
    pub num_instances: usize,
    pub num_masks: usize,
    /// Instances rendered without a mask (no-mask categories).
    pub num_unmasked: usize,
    pub num_rotated: usize,
    pub num_skipped_regions: usize,
}

impl Dataset {
    pub fn stats(&self) -> DatasetStats {
        let mut num_instances = 0;
        let mut num_masks = 0;
        let mut num_rotated = 0;
        let mut num_skipped_regions = 0;
        for img in &self.images {
            num_instances += img.instances.len();
            num_masks += img.mask_paths.len();
            num_rotated += img.instances.iter().filter(|i| i.rotation.is_some()).count();
            num_skipped_regions += img.skipped_regions.len();
        }
        DatasetStats {
            num_images: self.images.len(),
            num_instances,
            num_masks,
            num_unmasked: num_instances.saturating_sub(num_masks),
            num_rotated,
            num_skipped_regions,
        }
    }
}

impl DatasetStats {
    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Images: {}, Instances: {}, Masks: {}, Unmasked: {}, Rotated: {}, Skipped regions: {}",
            self.num_images,
            self.num_instances,
            self.num_masks,
            self.num_unmasked,
            self.num_rotated,
            self.num_skipped_regions,
        )
    }
}
