//! Read-only view of the template configuration.
//!
//! Layout on disk:
//! - `<config_dir>/backgrounds.json`: label -> `{ "shelves": [ShelfLineSpec, ...] }`
//! - `<config_dir>/foregrounds.json`: category -> label -> `{ "height", "width" }`
//! - `<config_dir>/class_map.json`: category -> class id
//! - `<template_dir>/backgrounds/<label>.jpg` and `<template_dir>/foregrounds/<category>/<label>.png`
//!
//! Everything is parsed and validated up front so a broken configuration never gets as
//! far as creating output directories. Maps are `BTreeMap`s: iteration order feeds the
//! seeded random draws and must not depend on hashing.

use crate::error::{Result, SynthError};
use crate::geometry::{Shelf, ShelfLineSpec};
use crate::model::{BackgroundDescriptor, ForegroundDescriptor};
use image::RgbaImage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

pub const BACKGROUNDS_FILE: &str = "backgrounds.json";
pub const FOREGROUNDS_FILE: &str = "foregrounds.json";
pub const CLASS_MAP_FILE: &str = "class_map.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackgroundConfig {
    pub shelves: Vec<ShelfLineSpec>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForegroundSize {
    pub height: u32,
    pub width: u32,
}

#[derive(Debug)]
pub struct TemplateStore {
    template_dir: PathBuf,
    backgrounds: BTreeMap<String, BackgroundConfig>,
    shelves: BTreeMap<String, Shelf>,
    foregrounds: BTreeMap<String, BTreeMap<String, ForegroundSize>>,
    class_map: BTreeMap<String, u32>,
}

impl TemplateStore {
    /// Loads and validates the three config files.
    #[instrument(skip_all)]
    pub fn open(config_dir: impl AsRef<Path>, template_dir: impl AsRef<Path>) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let backgrounds: BTreeMap<String, BackgroundConfig> =
            read_json(&config_dir.join(BACKGROUNDS_FILE))?;
        let foregrounds: BTreeMap<String, BTreeMap<String, ForegroundSize>> =
            read_json(&config_dir.join(FOREGROUNDS_FILE))?;
        let class_map: BTreeMap<String, u32> = read_json(&config_dir.join(CLASS_MAP_FILE))?;
        let store = Self::from_parts(template_dir, backgrounds, foregrounds, class_map)?;
        debug!(
            backgrounds = store.backgrounds.len(),
            categories = store.foregrounds.len(),
            "template configuration loaded"
        );
        Ok(store)
    }

    /// Builds a store from already-parsed configuration.
    pub fn from_parts(
        template_dir: impl AsRef<Path>,
        backgrounds: BTreeMap<String, BackgroundConfig>,
        foregrounds: BTreeMap<String, BTreeMap<String, ForegroundSize>>,
        class_map: BTreeMap<String, u32>,
    ) -> Result<Self> {
        if backgrounds.is_empty() {
            return Err(SynthError::InvalidConfig(format!(
                "{BACKGROUNDS_FILE} defines no backgrounds"
            )));
        }
        let mut shelves = BTreeMap::new();
        for (label, bg) in &backgrounds {
            let shelf = Shelf::from_lines(&bg.shelves)?;
            if shelf.regions().is_empty() {
                return Err(SynthError::InvalidConfig(format!(
                    "background '{label}' has no placeable shelf region"
                )));
            }
            shelves.insert(label.clone(), shelf);
        }
        for (category, objects) in &foregrounds {
            for (label, size) in objects {
                if size.width == 0 || size.height == 0 {
                    return Err(SynthError::InvalidConfig(format!(
                        "foreground '{category}/{label}' has zero native size"
                    )));
                }
            }
        }
        Ok(Self {
            template_dir: template_dir.as_ref().to_path_buf(),
            backgrounds,
            shelves,
            foregrounds,
            class_map,
        })
    }

    pub fn template_dir(&self) -> &Path {
        &self.template_dir
    }

    pub fn background_labels(&self) -> Vec<&str> {
        self.backgrounds.keys().map(String::as_str).collect()
    }

    pub fn background(&self, label: &str) -> Result<BackgroundDescriptor> {
        let bg = self
            .backgrounds
            .get(label)
            .ok_or_else(|| SynthError::UnknownBackground(label.to_string()))?;
        Ok(BackgroundDescriptor {
            label: label.to_string(),
            file: self
                .template_dir
                .join("backgrounds")
                .join(format!("{label}.jpg")),
            lines: bg.shelves.clone(),
        })
    }

    /// Parsed geometry of a background, built once at load time.
    pub fn shelf(&self, label: &str) -> Result<&Shelf> {
        self.shelves
            .get(label)
            .ok_or_else(|| SynthError::UnknownBackground(label.to_string()))
    }

    /// Object labels of a category, in sorted order.
    pub fn labels_in(&self, category: &str) -> Result<Vec<&str>> {
        let objects = self
            .foregrounds
            .get(category)
            .ok_or_else(|| SynthError::UnknownCategory(category.to_string()))?;
        if objects.is_empty() {
            return Err(SynthError::InvalidConfig(format!(
                "foreground category '{category}' has no objects"
            )));
        }
        Ok(objects.keys().map(String::as_str).collect())
    }

    pub fn foreground(&self, category: &str, label: &str) -> Result<ForegroundDescriptor> {
        let objects = self
            .foregrounds
            .get(category)
            .ok_or_else(|| SynthError::UnknownCategory(category.to_string()))?;
        let size = objects.get(label).ok_or_else(|| SynthError::UnknownObject {
            category: category.to_string(),
            label: label.to_string(),
        })?;
        Ok(ForegroundDescriptor {
            category: category.to_string(),
            label: label.to_string(),
            native_width: size.width,
            native_height: size.height,
            file: self
                .template_dir
                .join("foregrounds")
                .join(category)
                .join(format!("{label}.png")),
        })
    }

    pub fn class_id(&self, category: &str) -> Result<u32> {
        self.class_map
            .get(category)
            .copied()
            .ok_or_else(|| SynthError::MissingClassId(category.to_string()))
    }

    /// Inverted class map (`id -> category`) as written to `id_map.json`.
    pub fn id_class_map(&self) -> BTreeMap<u32, String> {
        self.class_map
            .iter()
            .map(|(category, id)| (*id, category.clone()))
            .collect()
    }

    /// Checks that every category resolves to at least one object and, when
    /// `annotated`, to a class id.
    pub fn check_categories<'a>(
        &self,
        categories: impl IntoIterator<Item = &'a String>,
        annotated: bool,
    ) -> Result<()> {
        for category in categories {
            self.labels_in(category)?;
            if annotated {
                self.class_id(category)?;
            }
        }
        Ok(())
    }

    /// Checks that every background photo and every cutout of `categories` is on disk.
    pub fn check_images<'a>(&self, categories: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for label in self.background_labels() {
            require_file(&self.background(label)?.file)?;
        }
        for category in categories {
            for label in self.labels_in(category)? {
                require_file(&self.foreground(category, label)?.file)?;
            }
        }
        Ok(())
    }

    pub fn load_background_image(&self, bg: &BackgroundDescriptor) -> Result<RgbaImage> {
        load_rgba(&bg.file)
    }

    pub fn load_cutout(&self, fg: &ForegroundDescriptor) -> Result<RgbaImage> {
        load_rgba(&fg.file)
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SynthError::MissingTemplateImage {
            path: path.to_path_buf(),
        })
    }
}

fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).map_err(|source| SynthError::TemplateImage {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgba8())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|source| SynthError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SynthError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}
