//! Core library for generating synthetic retail-shelf images with instance masks.
//!
//! - Geometry: slanted shelf boundary lines and the regions between them
//! - Layout: cursor-driven placement of scaled, optionally rotated cutouts per region
//! - Compositing: region layers merged through their masks into one canvas
//! - Pipeline: `Synthesizer::generate` writes a dataset directory; `ParallelRunner` fans
//!   out across workers and merges their outputs
//!
//! Quick example:
//! ```ignore
//! use shelf_synth_core::prelude::*;
//! # fn main() -> shelf_synth_core::Result<()> {
//! let synth = Synthesizer::open("configs", "templates")?;
//! let opts = GenerateOptions::builder()
//!     .categories(vec!["bottles".into()])
//!     .seed(7)
//!     .build();
//! let dataset = synth.generate(4, std::path::Path::new("out"), &opts)?;
//! println!("{}", dataset.stats().summary());
//! # Ok(()) }
//! ```

pub mod compositing;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod pipeline;
pub mod runner;
pub mod templates;

pub use config::*;
pub use error::*;
pub use geometry::*;
pub use model::*;
pub use pipeline::*;
pub use runner::*;
pub use templates::*;

/// Convenience prelude for common types and functions.
/// Importing `shelf_synth_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::config::{GenerateOptions, GenerateOptionsBuilder, ObjectSize};
    pub use crate::geometry::{Line, Point, Shelf, ShelfLineSpec, ShelfRegion};
    pub use crate::model::{Dataset, DatasetStats, GeneratedImage, PlacedInstance};
    pub use crate::runner::{MergeReport, ParallelRunner, merge_dataset_dirs};
    pub use crate::templates::TemplateStore;
    pub use crate::{Result, SynthError, Synthesizer};
}
