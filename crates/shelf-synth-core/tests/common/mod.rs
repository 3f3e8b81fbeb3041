#![allow(dead_code)]

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use serde_json::json;
use shelf_synth_core::{ShelfLineSpec, TemplateStore};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const BG_GRAY: Rgb<u8> = Rgb([90, 90, 90]);
pub const BOTTLE_RED: Rgba<u8> = Rgba([250, 10, 10, 255]);
pub const BOX_BLUE: Rgba<u8> = Rgba([10, 10, 250, 255]);

pub fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> ShelfLineSpec {
    ShelfLineSpec {
        x_start: x0,
        y_start: y0,
        x_end: x1,
        y_end: y1,
        is_dummy: false,
    }
}

pub fn dummy(x0: f64, y0: f64, x1: f64, y1: f64) -> ShelfLineSpec {
    ShelfLineSpec {
        is_dummy: true,
        ..line(x0, y0, x1, y1)
    }
}

/// On-disk template set:
/// - `flat`: 320x120, one region x in [0, 300] with constant height 100
/// - `slanted` (with `with_slanted`): 320x240, two slanted regions and a dummy-capped one
/// - categories `bottles` (100x100 opaque, class 1), `cans` (50x100 soft edge, class 2),
///   `boxes` (100x100 opaque, no class id)
pub struct Fixture {
    pub dir: TempDir,
    pub config_dir: PathBuf,
    pub template_dir: PathBuf,
}

impl Fixture {
    pub fn flat() -> Self {
        Self::build(false)
    }

    pub fn with_slanted() -> Self {
        Self::build(true)
    }

    fn build(slanted: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_dir = dir.path().join("configs");
        let template_dir = dir.path().join("templates");
        fs::create_dir_all(&config_dir).unwrap();
        fs::create_dir_all(template_dir.join("backgrounds")).unwrap();

        let mut backgrounds = BTreeMap::new();
        backgrounds.insert(
            "flat",
            json!({ "shelves": [line(0.0, 0.0, 300.0, 0.0), line(0.0, 100.0, 300.0, 100.0)] }),
        );
        write_background(&template_dir, "flat", 320, 120);
        if slanted {
            backgrounds.insert(
                "slanted",
                json!({ "shelves": [
                    line(0.0, 0.0, 300.0, 10.0),
                    line(0.0, 100.0, 300.0, 110.0),
                    line(0.0, 200.0, 300.0, 215.0),
                    dummy(0.0, 235.0, 300.0, 238.0),
                ]}),
            );
            write_background(&template_dir, "slanted", 320, 240);
        }

        let foregrounds = json!({
            "bottles": { "b1": { "height": 100, "width": 100 } },
            "cans": { "c1": { "height": 100, "width": 50 } },
            "boxes": { "x1": { "height": 100, "width": 100 } },
        });
        let class_map = json!({ "bottles": 1, "cans": 2 });

        write_cutout(&template_dir, "bottles", "b1", solid(100, 100, BOTTLE_RED));
        write_cutout(&template_dir, "cans", "c1", soft_edged(50, 100));
        write_cutout(&template_dir, "boxes", "x1", solid(100, 100, BOX_BLUE));

        write_json(&config_dir.join("backgrounds.json"), &json!(backgrounds));
        write_json(&config_dir.join("foregrounds.json"), &foregrounds);
        write_json(&config_dir.join("class_map.json"), &class_map);

        Self {
            dir,
            config_dir,
            template_dir,
        }
    }

    pub fn store(&self) -> TemplateStore {
        TemplateStore::open(&self.config_dir, &self.template_dir).expect("open store")
    }

    pub fn out_dir(&self) -> PathBuf {
        let out = self.dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        out
    }
}

fn write_background(template_dir: &Path, label: &str, w: u32, h: u32) {
    let img = RgbImage::from_pixel(w, h, BG_GRAY);
    img.save(template_dir.join("backgrounds").join(format!("{label}.jpg")))
        .unwrap();
}

fn write_cutout(template_dir: &Path, category: &str, label: &str, img: RgbaImage) {
    let dir = template_dir.join("foregrounds").join(category);
    fs::create_dir_all(&dir).unwrap();
    img.save(dir.join(format!("{label}.png"))).unwrap();
}

fn write_json(path: &Path, value: &serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

pub fn solid(w: u32, h: u32, px: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(w, h, px)
}

/// Opaque core with a transparent left and right border of 5 pixels.
pub fn soft_edged(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, _| {
        if x < 5 || x + 5 >= w {
            Rgba([0, 200, 0, 0])
        } else {
            Rgba([0, 200, 0, 255])
        }
    })
}

/// Every file under `root` as (relative path, bytes), sorted by path.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

pub fn list_dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
