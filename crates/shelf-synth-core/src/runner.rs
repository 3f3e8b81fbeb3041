//! Worker-level fan-out and the final merge of worker outputs.
//!
//! Each worker is an independent [`Synthesizer`] run with its own seed, image index
//! range and output directory (`<output_dir>/worker_<w>`). Workers share nothing but the
//! read-only template store; after all of them finish, their dataset trees are moved
//! into a single `synth_data_<stamp>` directory.

use crate::config::GenerateOptions;
use crate::error::{Result, SynthError};
use crate::model::Dataset;
use crate::pipeline::{ID_MAP_FILE, Synthesizer, dataset_dir_name, timestamp_now};
use crate::templates::TemplateStore;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// What one worker produced.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub worker: usize,
    pub seed: u64,
    /// `<output_dir>/worker_<w>`; removed by [`merge`] once emptied.
    pub root: PathBuf,
    pub dataset: Dataset,
}

/// A file that could not be moved during merge; it is left at `source`.
#[derive(Debug, Clone, Serialize)]
pub struct MoveFailure {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

/// Outcome of merging worker outputs.
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub dataset_path: PathBuf,
    pub moved_files: usize,
    pub images: usize,
    pub failures: Vec<MoveFailure>,
}

impl MergeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Default worker count: available hardware parallelism.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Draws `workers` distinct seeds by sampling without replacement from `0..10*n`.
///
/// The range is widened to at least `workers` values so the draw cannot fail.
/// Distinct per run, but not guaranteed distinct across runs.
pub fn worker_seeds(master_seed: u64, n: usize, workers: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(master_seed);
    let range = n.saturating_mul(10).max(workers);
    rand::seq::index::sample(&mut rng, range, workers)
        .into_iter()
        .map(|i| i as u64)
        .collect()
}

pub struct ParallelRunner {
    store: Arc<TemplateStore>,
    workers: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl ParallelRunner {
    pub fn new(store: Arc<TemplateStore>) -> Self {
        Self {
            store,
            workers: default_workers(),
            cancel: None,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Shared flag observed by every worker between images.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Worker count actually used for `n` images (never more workers than images).
    pub fn effective_workers(&self, n: usize) -> usize {
        self.workers.clamp(1, n.max(1))
    }

    /// Generates about `n` images across workers and merges them into
    /// `<output_dir>/synth_data_<stamp>`.
    ///
    /// Each worker produces `n / W` images; the remainder is dropped.
    /// `opts.seed` is the master seed from which worker seeds are drawn.
    #[instrument(skip_all, fields(n = n, master_seed = opts.seed))]
    pub fn run(&self, n: usize, output_dir: &Path, opts: &GenerateOptions) -> Result<MergeReport> {
        let synth = self.synthesizer();
        synth.preflight(opts)?;

        let workers = self.effective_workers(n);
        let per_worker = n / workers;
        if per_worker * workers != n {
            warn!(
                requested = n,
                generated = per_worker * workers,
                "image count is not divisible by worker count; remainder dropped"
            );
        }
        let stamp = opts.stamp.clone().unwrap_or_else(timestamp_now);
        let seeds = worker_seeds(opts.seed, n, workers);
        info!(workers, per_worker, "starting workers");

        let jobs: Vec<(usize, u64)> = seeds.into_iter().enumerate().collect();
        let run_one = |&(worker, seed): &(usize, u64)| -> Result<WorkerResult> {
            let root = output_dir.join(format!("worker_{worker}"));
            let mut wopts = opts.clone();
            wopts.seed = seed;
            wopts.stamp = Some(stamp.clone());
            wopts.image_index_offset = opts.image_index_offset + worker * per_worker;
            debug!(worker, seed, "worker started");
            let dataset = synth.generate(per_worker, &root, &wopts)?;
            Ok(WorkerResult {
                worker,
                seed,
                root,
                dataset,
            })
        };

        #[cfg(feature = "parallel")]
        let results: Result<Vec<WorkerResult>> = jobs.par_iter().map(run_one).collect();
        #[cfg(not(feature = "parallel"))]
        let results: Result<Vec<WorkerResult>> = jobs.iter().map(run_one).collect();

        merge(&results?, output_dir)
    }

    fn synthesizer(&self) -> Synthesizer {
        let synth = Synthesizer::new(self.store.clone());
        match &self.cancel {
            Some(flag) => synth.with_cancel(flag.clone()),
            None => synth,
        }
    }
}

/// Moves every worker's dataset files into `<output_dir>/synth_data_<stamp>` and removes
/// the emptied worker directories.
///
/// A file that cannot be moved is logged, left in place and listed in the report; the
/// merge carries on with the remaining files.
#[instrument(skip_all, fields(workers = results.len()))]
pub fn merge(results: &[WorkerResult], output_dir: &Path) -> Result<MergeReport> {
    let first = results.first().ok_or(SynthError::Empty)?;
    let final_dir = output_dir.join(dataset_dir_name(&first.dataset.stamp));
    let dirs: Vec<PathBuf> = results.iter().map(|r| r.dataset.path.clone()).collect();
    let mut report = merge_into(&dirs, &final_dir)?;
    for r in results {
        remove_empty_tree(&r.root);
    }
    report.images = count_images(&final_dir);
    Ok(report)
}

/// Merges arbitrary dataset directories into `<output_dir>/<name of the first directory>`.
pub fn merge_dataset_dirs(dirs: &[PathBuf], output_dir: &Path) -> Result<MergeReport> {
    let first = dirs.first().ok_or(SynthError::Empty)?;
    let name = first
        .file_name()
        .ok_or_else(|| SynthError::InvalidConfig(format!("bad dataset dir {}", first.display())))?;
    let final_dir = output_dir.join(name);
    let sources: Vec<PathBuf> = dirs.iter().filter(|d| **d != final_dir).cloned().collect();
    let mut report = merge_into(&sources, &final_dir)?;
    for d in &sources {
        remove_empty_tree(d);
        if let Some(parent) = d.parent().filter(|p| is_worker_root(p) && *p != output_dir) {
            if let Err(e) = fs::remove_dir(parent) {
                debug!(dir = %parent.display(), error = %e, "worker directory kept");
            }
        }
    }
    report.images = count_images(&final_dir);
    Ok(report)
}

fn merge_into(sources: &[PathBuf], final_dir: &Path) -> Result<MergeReport> {
    fs::create_dir_all(final_dir)?;
    let mut moved_files = 0usize;
    let mut failures: Vec<MoveFailure> = Vec::new();

    for src_root in sources {
        for entry in WalkDir::new(src_root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(root = %src_root.display(), error = %e, "unreadable entry during merge");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let src = entry.path();
            let Ok(rel) = src.strip_prefix(src_root) else {
                continue;
            };
            let dest = final_dir.join(rel);
            match move_file(src, &dest) {
                Ok(true) => moved_files += 1,
                Ok(false) => {}
                Err(reason) => {
                    warn!(src = %src.display(), dest = %dest.display(), %reason, "file move failed; left in place");
                    failures.push(MoveFailure {
                        source: src.to_path_buf(),
                        destination: dest,
                        reason,
                    });
                }
            }
        }
    }

    if !failures.is_empty() {
        warn!(failed = failures.len(), moved = moved_files, "merge finished with failures");
    }
    info!(path = %final_dir.display(), moved = moved_files, "merge complete");
    Ok(MergeReport {
        dataset_path: final_dir.to_path_buf(),
        moved_files,
        images: 0,
        failures,
    })
}

/// Ok(true) when moved, Ok(false) when the source was a duplicate id map and dropped.
fn move_file(src: &Path, dest: &Path) -> std::result::Result<bool, String> {
    if dest.exists() {
        let is_id_map = src.file_name().is_some_and(|n| n == ID_MAP_FILE);
        if is_id_map && same_contents(src, dest) {
            fs::remove_file(src).map_err(|e| e.to_string())?;
            return Ok(false);
        }
        return Err("destination already exists".to_string());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::rename(src, dest).map_err(|e| e.to_string())?;
    Ok(true)
}

/// `worker_<w>` wrapper created by [`ParallelRunner::run`].
fn is_worker_root(dir: &Path) -> bool {
    dir.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix("worker_"))
        .is_some_and(|w| !w.is_empty() && w.bytes().all(|b| b.is_ascii_digit()))
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (fs::read(a), fs::read(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Removes `root` and its subdirectories bottom-up, stopping at anything non-empty.
fn remove_empty_tree(root: &Path) {
    for entry in WalkDir::new(root).contents_first(true).into_iter().flatten() {
        if entry.file_type().is_dir() {
            if let Err(e) = fs::remove_dir(entry.path()) {
                debug!(dir = %entry.path().display(), error = %e, "directory kept");
            }
        }
    }
}

fn count_images(dataset_dir: &Path) -> usize {
    fs::read_dir(dataset_dir)
        .map(|rd| rd.flatten().filter(|e| e.path().is_dir()).count())
        .unwrap_or(0)
}
