//! Stochastic placement of foreground objects along one shelf region.
//!
//! A cursor walks the region from `x_start` to `x_end`. Each step draws an object,
//! scales it to the local shelf height, and lays down a "pack" of copies standing on
//! the bottom line, each optionally rotated, separated by a random gap. The walk ends
//! as soon as an instance would cross `x_end`; the remaining width stays empty.

use crate::compositing::{instance_mask, paste_alpha, rotate_expand, scale_cutout, union_mask};
use crate::config::{GenerateOptions, ObjectSize};
use crate::error::{Result, SynthError};
use crate::geometry::ShelfRegion;
use crate::model::{ForegroundDescriptor, PlacedInstance, RegionResult};
use crate::templates::TemplateStore;
use image::{GrayImage, RgbaImage};
use rand::Rng;
use rand::seq::SliceRandom;
use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// One unit of region work: which band to fill and where its masks go.
pub struct RegionJob<'a> {
    pub region: &'a ShelfRegion,
    /// Index among the background's placeable regions; used in mask file names.
    pub shelf_index: usize,
    pub background: &'a RgbaImage,
    /// `train_mask` directory of the image being generated.
    pub mask_dir: &'a Path,
}

/// Read-only inputs shared by every region of a run.
pub struct LayoutContext<'a> {
    store: &'a TemplateStore,
    opts: &'a GenerateOptions,
    pool: Vec<String>,
}

impl<'a> LayoutContext<'a> {
    pub fn new(store: &'a TemplateStore, opts: &'a GenerateOptions) -> Self {
        Self {
            store,
            opts,
            pool: opts.category_pool(),
        }
    }

    pub fn store(&self) -> &TemplateStore {
        self.store
    }

    pub fn options(&self) -> &GenerateOptions {
        self.opts
    }
}

/// Name of the persisted mask of one instance: `mask_<shelf>_<obj>$<class>.png`.
pub fn mask_file_name(shelf_index: usize, obj_index: usize, class_id: u32) -> String {
    format!("mask_{shelf_index}_{obj_index}${class_id}.png")
}

/// Scaled size for an object of native size `fg` on a shelf `local_height` tall.
/// Height is floored; width keeps the native aspect ratio (floored).
pub fn scaled_size(fg: &ForegroundDescriptor, local_height: f64, size: ObjectSize) -> (u32, u32) {
    let h = (local_height * size.factor()).floor().max(0.0);
    let w = (h / f64::from(fg.native_height) * f64::from(fg.native_width)).floor();
    (w as u32, h as u32)
}

/// Fills one region and returns its layer, combined mask and placements.
///
/// Mask files for annotated categories are written into `job.mask_dir` while placing.
/// Fails with [`SynthError::InvalidConfig`] when the options do not validate.
pub fn fill_region<R: Rng>(
    ctx: &LayoutContext<'_>,
    job: &RegionJob<'_>,
    rng: &mut R,
) -> Result<RegionResult> {
    let opts = ctx.opts;
    opts.validate()?;
    let region = job.region;
    let (cw, ch) = job.background.dimensions();
    let mut image = job.background.clone();
    let mut mask = GrayImage::new(cw, ch);
    let mut instances: Vec<PlacedInstance> = Vec::new();
    let mut mask_files: Vec<PathBuf> = Vec::new();
    // decoded cutouts, private to this region
    let mut cutouts: HashMap<(String, String), RgbaImage> = HashMap::new();

    let x_end = region.x_end();
    // never start left of the region
    let mut cursor_x = region.x_start().ceil() as i64;
    let mut obj_index = 0usize;

    'region: while (cursor_x as f64) < x_end {
        let category = ctx
            .pool
            .choose(rng)
            .ok_or_else(|| SynthError::InvalidConfig("empty category pool".into()))?;
        let labels = ctx.store.labels_in(category)?;
        let label = *labels
            .choose(rng)
            .ok_or_else(|| SynthError::UnknownCategory(category.clone()))?;
        let fg = ctx.store.foreground(category, label)?;
        let has_mask = !opts.is_nomask(category);
        let class_id = if has_mask {
            Some(ctx.store.class_id(category)?)
        } else {
            None
        };

        let local_height = region.height_at(cursor_x as f64);
        let size = *opts
            .obj_sizes_allowed
            .choose(rng)
            .ok_or_else(|| SynthError::InvalidConfig("obj_sizes_allowed is empty".into()))?;
        let (w, h) = scaled_size(&fg, local_height, size);
        let pack = rng.gen_range(1..=opts.max_objs_in_pack);

        if w == 0 || h == 0 {
            // too thin to hold this object here; step past it
            cursor_x += i64::from(rng.gen_range(1..=opts.max_x_offset));
            trace!(cursor_x, local_height, "degenerate object size, skipping");
            continue;
        }

        let raw = match cutouts.entry((fg.category.clone(), fg.label.clone())) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(ctx.store.load_cutout(&fg)?),
        };
        let scaled = scale_cutout(raw, w, h);

        for _ in 0..pack {
            let (sprite, rotation) = if rng.gen_bool(opts.rotation_probability) {
                let angle = rng.gen_range(-90.0..90.0);
                (Cow::Owned(rotate_expand(&scaled, angle)), Some(angle))
            } else {
                (Cow::Borrowed(&scaled), None)
            };
            let (iw, ih) = sprite.dimensions();
            let bottom_y = region.bottom_line().y_at(cursor_x as f64).round() as i64;
            let top_y = bottom_y - i64::from(ih);

            if (cursor_x + i64::from(iw)) as f64 > x_end {
                break 'region;
            }

            obj_index += 1;
            paste_alpha(&sprite, &mut image, cursor_x, top_y);
            let inst_mask = instance_mask(&sprite, cw, ch, cursor_x, top_y);
            union_mask(&mut mask, &inst_mask)?;

            if let Some(class_id) = class_id {
                let path = job
                    .mask_dir
                    .join(mask_file_name(job.shelf_index, obj_index, class_id));
                inst_mask.save(&path)?;
                mask_files.push(path);
            }

            instances.push(PlacedInstance {
                x: cursor_x,
                y: top_y,
                width: iw,
                height: ih,
                rotation,
                size,
                category: fg.category.clone(),
                label: fg.label.clone(),
                class_id,
                has_mask,
            });

            cursor_x += i64::from(iw) + i64::from(rng.gen_range(1..=opts.max_x_offset));
            if cursor_x as f64 >= x_end {
                break;
            }
        }
    }

    debug!(
        shelf = job.shelf_index,
        placed = instances.len(),
        masks = mask_files.len(),
        "region filled"
    );
    Ok(RegionResult {
        shelf_index: job.shelf_index,
        image,
        mask,
        instances,
        mask_files,
    })
}
