use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use shelf_synth_core::runner::{self, MergeReport, ParallelRunner};
use shelf_synth_core::{GenerateOptions, ObjectSize, TemplateStore};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "shelf-synth",
    about = "Generate synthetic shelf images with per-object instance masks",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show a progress spinner (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a dataset of composited shelf images and masks
    Generate(GenerateArgs),
    /// Print the parsed shelf geometry of every background as JSON
    Shelves(TemplateArgs),
    /// Merge existing dataset directories into one
    Merge(MergeArgs),
}

#[derive(Parser, Debug, Clone)]
struct TemplateArgs {
    /// Directory holding backgrounds.json, foregrounds.json and class_map.json
    #[arg(long, default_value = "configs", help_heading = "Input/Output")]
    config_dir: PathBuf,
    /// Directory holding backgrounds/ and foregrounds/ images
    #[arg(long, default_value = "templates", help_heading = "Input/Output")]
    template_dir: PathBuf,
}

#[derive(Parser, Debug, Clone)]
struct GenerateArgs {
    #[command(flatten)]
    templates: TemplateArgs,
    /// Output directory; the dataset lands in <out-dir>/synth_data_<stamp>
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Number of images to generate
    #[arg(short, default_value_t = 1, help_heading = "Input/Output")]
    n: usize,
    /// YAML file overriding generation options
    #[arg(long, help_heading = "Input/Output")]
    options: Option<PathBuf>,

    // Objects
    /// Annotated foreground category (repeatable)
    #[arg(long = "category", help_heading = "Objects")]
    categories: Vec<String>,
    /// Foreground category placed without masks (repeatable)
    #[arg(long = "nomask", help_heading = "Objects")]
    nomask_categories: Vec<String>,
    /// Allowed sizes: comma separated list of s|m|l
    #[arg(long, value_delimiter = ',', default_value = "s,m,l", help_heading = "Objects")]
    sizes: Vec<String>,
    /// Largest number of identical objects placed side by side
    #[arg(long, default_value_t = 3, help_heading = "Objects")]
    max_pack: u32,

    // Layout
    /// Probability of rotating an instance
    #[arg(long, default_value_t = 0.1, help_heading = "Layout")]
    rotation: f64,
    /// Largest horizontal gap between neighbours (pixels)
    #[arg(long, default_value_t = 1, help_heading = "Layout")]
    max_x_offset: u32,
    /// Probability of leaving a shelf (other than the first) empty
    #[arg(long, default_value_t = 0.0, help_heading = "Layout")]
    skip_shelf: f64,

    // Run
    /// Master seed; drawn at random when omitted
    #[arg(long, help_heading = "Run")]
    seed: Option<u64>,
    /// Dataset timestamp (%Y_%m_%d_%H_%M_%S); current UTC time when omitted
    #[arg(long, help_heading = "Run")]
    stamp: Option<String>,
    /// Worker count (defaults to available parallelism)
    #[arg(long, help_heading = "Run")]
    workers: Option<usize>,
    /// Fill shelf regions of one image sequentially
    #[arg(long, default_value_t = false, help_heading = "Run")]
    no_parallel_regions: bool,

    /// Print the merged options (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Write the merge report as JSON to this file
    #[arg(long, help_heading = "Export")]
    export_report: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
struct MergeArgs {
    /// Dataset directories to merge (the first one names the result)
    #[arg(required = true)]
    dirs: Vec<PathBuf>,
    /// Destination parent directory
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Generate(args) => run_generate(args, cli.progress && !cli.quiet),
        Commands::Shelves(args) => run_shelves(args),
        Commands::Merge(args) => run_merge(args),
    }
}

fn run_generate(args: &GenerateArgs, show_progress: bool) -> anyhow::Result<()> {
    let mut opts = options_from_args(args)?;
    if let Some(path) = &args.options {
        let file = fs::read_to_string(path)
            .with_context(|| format!("read options {}", path.display()))?;
        let y: YamlOptions = serde_yaml::from_str(&file)
            .with_context(|| format!("parse options {}", path.display()))?;
        opts = y.into_options(opts)?;
    }

    if args.print_config {
        match args.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&opts)?),
            _ => println!("{}", serde_json::to_string_pretty(&opts)?),
        }
        return Ok(());
    }

    let store = TemplateStore::open(&args.templates.config_dir, &args.templates.template_dir)
        .with_context(|| {
            format!(
                "load templates from {} / {}",
                args.templates.config_dir.display(),
                args.templates.template_dir.display()
            )
        })?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create out_dir {}", args.out_dir.display()))?;

    let mut runner = ParallelRunner::new(Arc::new(store));
    if let Some(w) = args.workers {
        runner = runner.workers(w);
    }
    info!(
        n = args.n,
        seed = opts.seed,
        workers = runner.effective_workers(args.n),
        "generating dataset"
    );

    let spinner = spinner(show_progress, "generating images");
    let start = Instant::now();
    let result = runner.run(args.n, &args.out_dir, &opts);
    if let Some(s) = &spinner {
        s.finish_and_clear();
    }
    let report = result.context("dataset generation failed")?;

    report_merge(&report);
    info!(
        path = %report.dataset_path.display(),
        images = report.images,
        files = report.moved_files,
        time = fmt_dur(start.elapsed()),
        "dataset written"
    );
    if let Some(path) = &args.export_report {
        fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("write {}", path.display()))?;
    }
    println!("{}", report.dataset_path.display());
    Ok(())
}

fn run_shelves(args: &TemplateArgs) -> anyhow::Result<()> {
    let store = TemplateStore::open(&args.config_dir, &args.template_dir)
        .with_context(|| format!("load templates from {}", args.config_dir.display()))?;
    let mut backgrounds = Vec::new();
    for label in store.background_labels() {
        let shelf = store.shelf(label)?;
        let regions: Vec<RegionView> = shelf
            .all_regions()
            .iter()
            .enumerate()
            .map(|(i, r)| RegionView {
                index: i,
                x_start: r.x_start(),
                x_end: r.x_end(),
                y_start: r.y_start(),
                y_end: r.y_end(),
                is_dummy: r.is_dummy(),
            })
            .collect();
        backgrounds.push(BackgroundView {
            label: label.to_string(),
            placeable: shelf.regions().len(),
            regions,
        });
    }
    println!("{}", serde_json::to_string_pretty(&backgrounds)?);
    Ok(())
}

fn run_merge(args: &MergeArgs) -> anyhow::Result<()> {
    for d in &args.dirs {
        if !d.is_dir() {
            anyhow::bail!("not a directory: {}", d.display());
        }
    }
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create out_dir {}", args.out_dir.display()))?;
    let report = runner::merge_dataset_dirs(&args.dirs, &args.out_dir)
        .with_context(|| format!("merge into {}", args.out_dir.display()))?;
    report_merge(&report);
    println!("{}", report.dataset_path.display());
    Ok(())
}

fn report_merge(report: &MergeReport) {
    if report.is_clean() {
        return;
    }
    warn!(
        failures = report.failures.len(),
        "some files could not be moved and were left in place"
    );
    for f in &report.failures {
        warn!(source = %f.source.display(), reason = %f.reason, "not merged");
    }
}

fn options_from_args(args: &GenerateArgs) -> anyhow::Result<GenerateOptions> {
    let defaults = GenerateOptions::default();
    let categories = if args.categories.is_empty() {
        defaults.categories
    } else {
        args.categories.clone()
    };
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut builder = GenerateOptions::builder()
        .categories(categories)
        .nomask_categories(args.nomask_categories.iter().cloned())
        .rotation_probability(args.rotation)
        .max_x_offset(args.max_x_offset)
        .obj_sizes_allowed(parse_sizes(&args.sizes)?)
        .max_objs_in_pack(args.max_pack)
        .skip_shelf_probability(args.skip_shelf)
        .seed(seed)
        .parallel_regions(!args.no_parallel_regions);
    if let Some(stamp) = &args.stamp {
        builder = builder.stamp(stamp.clone());
    }
    Ok(builder.build())
}

fn parse_sizes(list: &[String]) -> anyhow::Result<Vec<ObjectSize>> {
    let mut sizes = Vec::with_capacity(list.len());
    for s in list {
        let size: ObjectSize = s
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown object size: {} (expected s|m|l)", s))?;
        if !sizes.contains(&size) {
            sizes.push(size);
        }
    }
    Ok(sizes)
}

fn spinner(enabled: bool, msg: &str) -> Option<indicatif::ProgressBar> {
    use indicatif::{ProgressBar, ProgressStyle};
    if !enabled {
        return None;
    }
    let b = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]") {
        b.set_style(style);
    }
    b.set_message(msg.to_string());
    b.enable_steady_tick(Duration::from_millis(120));
    Some(b)
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{:.1}ms", ms)
    }
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

#[derive(Serialize)]
struct RegionView {
    index: usize,
    x_start: f64,
    x_end: f64,
    y_start: f64,
    y_end: f64,
    is_dummy: bool,
}

#[derive(Serialize)]
struct BackgroundView {
    label: String,
    placeable: usize,
    regions: Vec<RegionView>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct YamlOptions {
    categories: Option<Vec<String>>,
    nomask_categories: Option<Vec<String>>,
    rotation_probability: Option<f64>,
    max_x_offset: Option<u32>,
    obj_sizes_allowed: Option<Vec<String>>,
    max_objs_in_pack: Option<u32>,
    skip_shelf_probability: Option<f64>,
    seed: Option<u64>,
    stamp: Option<String>,
    parallel_regions: Option<bool>,
}

impl YamlOptions {
    fn into_options(self, mut opts: GenerateOptions) -> anyhow::Result<GenerateOptions> {
        if let Some(v) = self.categories {
            opts.categories = v;
        }
        if let Some(v) = self.nomask_categories {
            opts.nomask_categories = v;
        }
        if let Some(v) = self.rotation_probability {
            opts.rotation_probability = v;
        }
        if let Some(v) = self.max_x_offset {
            opts.max_x_offset = v;
        }
        if let Some(v) = self.obj_sizes_allowed {
            opts.obj_sizes_allowed = parse_sizes(&v)?;
        }
        if let Some(v) = self.max_objs_in_pack {
            opts.max_objs_in_pack = v;
        }
        if let Some(v) = self.skip_shelf_probability {
            opts.skip_shelf_probability = v;
        }
        if let Some(v) = self.seed {
            opts.seed = v;
        }
        if let Some(v) = self.stamp {
            opts.stamp = Some(v);
        }
        if let Some(v) = self.parallel_regions {
            opts.parallel_regions = v;
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_accept_short_and_long_names() {
        let sizes = parse_sizes(&["s".into(), "Large".into(), "m".into(), "s".into()]).unwrap();
        assert_eq!(
            sizes,
            vec![ObjectSize::Small, ObjectSize::Large, ObjectSize::Medium]
        );
        assert!(parse_sizes(&["xl".into()]).is_err());
    }

    #[test]
    fn yaml_overrides_only_named_fields() {
        let base = GenerateOptions::builder().seed(3).max_x_offset(5).build();
        let y: YamlOptions =
            serde_yaml::from_str("rotation_probability: 0.5\nobj_sizes_allowed: [l]\n").unwrap();
        let merged = y.into_options(base).unwrap();
        assert_eq!(merged.rotation_probability, 0.5);
        assert_eq!(merged.obj_sizes_allowed, vec![ObjectSize::Large]);
        assert_eq!(merged.seed, 3);
        assert_eq!(merged.max_x_offset, 5);
    }

    #[test]
    fn cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "shelf-synth",
            "generate",
            "-n",
            "4",
            "--category",
            "bottles",
            "--category",
            "cans",
            "--nomask",
            "boxes",
            "--sizes",
            "s,l",
            "--seed",
            "9",
            "--workers",
            "2",
        ])
        .unwrap();
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let opts = options_from_args(&args).unwrap();
        assert_eq!(args.n, 4);
        assert_eq!(args.workers, Some(2));
        assert_eq!(opts.categories, vec!["bottles", "cans"]);
        assert_eq!(opts.nomask_categories, vec!["boxes"]);
        assert_eq!(opts.obj_sizes_allowed, vec![ObjectSize::Small, ObjectSize::Large]);
        assert_eq!(opts.seed, 9);
        assert!(opts.parallel_regions);
    }
}
