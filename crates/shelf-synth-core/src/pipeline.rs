use crate::compositing::compose_regions;
use crate::config::GenerateOptions;
use crate::error::{Result, SynthError};
use crate::geometry::ShelfRegion;
use crate::layout::{LayoutContext, RegionJob, fill_region};
use crate::model::{Dataset, GeneratedImage, RegionResult};
use crate::templates::TemplateStore;
use image::{DynamicImage, RgbaImage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const ID_MAP_FILE: &str = "id_map.json";
pub const IMAGE_DIR: &str = "train_image";
pub const MASK_DIR: &str = "train_mask";

/// UTC timestamp used in dataset and image names.
pub fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y_%m_%d_%H_%M_%S").to_string()
}

pub fn dataset_dir_name(stamp: &str) -> String {
    format!("synth_data_{stamp}")
}

pub fn image_name(index: usize, stamp: &str) -> String {
    format!("image_{index}_{stamp}")
}

/// Drives dataset runs over one template store.
///
/// All randomness comes from a `StdRng` seeded from [`GenerateOptions::seed`]; each
/// shelf region gets its own stream seeded from that generator in a fixed order, so
/// filling regions concurrently never changes the output.
#[derive(Clone)]
pub struct Synthesizer {
    store: Arc<TemplateStore>,
    cancel: Option<Arc<AtomicBool>>,
}

struct RegionPlan<'a> {
    shelf_index: usize,
    region: &'a ShelfRegion,
    seed: u64,
}

impl Synthesizer {
    pub fn new(store: Arc<TemplateStore>) -> Self {
        Self { store, cancel: None }
    }

    /// Loads the template store from disk.
    pub fn open(config_dir: impl AsRef<Path>, template_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Arc::new(TemplateStore::open(config_dir, template_dir)?)))
    }

    /// Checked before each image; when set, `generate` stops with [`SynthError::Cancelled`].
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Validates options, resolves every requested category and checks that the template
    /// images exist. Nothing is written until this passes.
    pub fn preflight(&self, opts: &GenerateOptions) -> Result<()> {
        opts.validate()?;
        self.store.check_categories(&opts.categories, true)?;
        self.store.check_categories(&opts.nomask_categories, false)?;
        self.store.check_images(&opts.category_pool())?;
        Ok(())
    }

    /// Generates `n` images into `<output_dir>/synth_data_<stamp>/` and returns the dataset.
    ///
    /// Notes:
    /// - `id_map.json` (class id -> category) is written once per dataset.
    /// - Region 0 of every image is always filled; later regions are skipped with
    ///   probability `skip_shelf_probability`.
    /// - The same seed, stamp and template configuration reproduce the output byte for byte.
    #[instrument(skip_all, fields(n = n, seed = opts.seed))]
    pub fn generate(&self, n: usize, output_dir: &Path, opts: &GenerateOptions) -> Result<Dataset> {
        self.preflight(opts)?;

        let stamp = opts.stamp.clone().unwrap_or_else(timestamp_now);
        let dataset_path = output_dir.join(dataset_dir_name(&stamp));
        fs::create_dir_all(&dataset_path)?;

        let id_class_map = self.store.id_class_map();
        let id_map_json = serde_json::to_string_pretty(&id_class_map)
            .map_err(|e| SynthError::Encode(e.to_string()))?;
        fs::write(dataset_path.join(ID_MAP_FILE), id_map_json)?;

        let ctx = LayoutContext::new(&self.store, opts);
        let mut rng = StdRng::seed_from_u64(opts.seed);
        let mut images = Vec::with_capacity(n);
        for i in 0..n {
            if self.is_cancelled() {
                return Err(SynthError::Cancelled);
            }
            let index = opts.image_index_offset + i;
            info!("Generating image {} of {}", i + 1, n);
            let img = self.generate_image(&ctx, &mut rng, index, &stamp, &dataset_path)?;
            images.push(img);
        }

        info!(path = %dataset_path.display(), images = images.len(), "dataset written");
        Ok(Dataset {
            path: dataset_path,
            stamp,
            id_class_map,
            images,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn generate_image(
        &self,
        ctx: &LayoutContext<'_>,
        rng: &mut StdRng,
        index: usize,
        stamp: &str,
        dataset_path: &Path,
    ) -> Result<GeneratedImage> {
        let opts = ctx.options();
        let labels = self.store.background_labels();
        let label = *labels
            .choose(rng)
            .ok_or_else(|| SynthError::InvalidConfig("no backgrounds configured".into()))?;
        let background = self.store.background(label)?;
        let shelf = self.store.shelf(label)?;

        // Draw every decision up front, in region order, so region work is order-free.
        let mut plans: Vec<RegionPlan<'_>> = Vec::new();
        let mut skipped_regions = Vec::new();
        for (shelf_index, region) in shelf.regions().into_iter().enumerate() {
            if shelf_index > 0 && rng.gen_bool(opts.skip_shelf_probability) {
                skipped_regions.push(shelf_index);
                continue;
            }
            plans.push(RegionPlan {
                shelf_index,
                region,
                seed: rng.r#gen::<u64>(),
            });
        }

        let name = image_name(index, stamp);
        let image_dir = dataset_path.join(&name);
        let mask_dir = image_dir.join(MASK_DIR);
        fs::create_dir_all(image_dir.join(IMAGE_DIR))?;
        fs::create_dir_all(&mask_dir)?;

        let canvas = self.store.load_background_image(&background)?;
        debug!(
            background = label,
            regions = plans.len(),
            skipped = skipped_regions.len(),
            "image planned"
        );
        let results = run_regions(ctx, &plans, &canvas, &mask_dir)?;

        let mut instances = Vec::new();
        let mut mask_paths: Vec<PathBuf> = Vec::new();
        for r in &results {
            instances.extend(r.instances.iter().cloned());
            mask_paths.extend(r.mask_files.iter().cloned());
        }
        let final_image = compose_regions(results)?;
        let image_path = image_dir.join(IMAGE_DIR).join(format!("{name}.png"));
        DynamicImage::ImageRgba8(final_image)
            .to_rgb8()
            .save(&image_path)?;

        Ok(GeneratedImage {
            index,
            name,
            background: label.to_string(),
            image_path,
            mask_paths,
            skipped_regions,
            instances,
        })
    }
}

fn run_region(
    ctx: &LayoutContext<'_>,
    plan: &RegionPlan<'_>,
    canvas: &RgbaImage,
    mask_dir: &Path,
) -> Result<RegionResult> {
    let mut rng = StdRng::seed_from_u64(plan.seed);
    let job = RegionJob {
        region: plan.region,
        shelf_index: plan.shelf_index,
        background: canvas,
        mask_dir,
    };
    fill_region(ctx, &job, &mut rng)
}

/// Fills every planned region; results come back in plan (top-to-bottom) order.
fn run_regions(
    ctx: &LayoutContext<'_>,
    plans: &[RegionPlan<'_>],
    canvas: &RgbaImage,
    mask_dir: &Path,
) -> Result<Vec<RegionResult>> {
    #[cfg(feature = "parallel")]
    {
        if ctx.options().parallel_regions {
            return plans
                .par_iter()
                .map(|plan| run_region(ctx, plan, canvas, mask_dir))
                .collect();
        }
    }
    plans
        .iter()
        .map(|plan| run_region(ctx, plan, canvas, mask_dir))
        .collect()
}
