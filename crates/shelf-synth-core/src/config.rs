use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Object size relative to the local shelf height.
/// Closed set: an object is scaled to 60%, 70% or 80% of the height at its position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ObjectSize {
    Small,
    Medium,
    Large,
}

impl ObjectSize {
    pub const ALL: [ObjectSize; 3] = [ObjectSize::Small, ObjectSize::Medium, ObjectSize::Large];

    /// Height multiplier applied to the local shelf height.
    pub fn factor(self) -> f64 {
        match self {
            ObjectSize::Small => 0.6,
            ObjectSize::Medium => 0.7,
            ObjectSize::Large => 0.8,
        }
    }
}

impl FromStr for ObjectSize {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "small" => Ok(Self::Small),
            "m" | "medium" => Ok(Self::Medium),
            "l" | "large" => Ok(Self::Large),
            _ => Err(()),
        }
    }
}

/// Tuning knobs for one dataset run.
/// Key notes:
///   - `categories` are annotated; `nomask_categories` are rendered as clutter without masks
///   - `seed` fully determines the run for a fixed template configuration
///   - `stamp` names the dataset; leave `None` to use the current UTC time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateOptions {
    /// Foreground categories whose instances get a mask file.
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    /// Foreground categories placed as visual noise, never annotated.
    #[serde(default)]
    pub nomask_categories: Vec<String>,
    /// Probability that an instance is rotated by a random angle in [-90°, 90°).
    #[serde(default = "default_rotation_probability")]
    pub rotation_probability: f64,
    /// Largest horizontal gap (pixels) between neighbours; gaps are drawn from `1..=max_x_offset`.
    #[serde(default = "default_max_x_offset")]
    pub max_x_offset: u32,
    /// Size factors that may be drawn.
    #[serde(default = "default_obj_sizes")]
    pub obj_sizes_allowed: Vec<ObjectSize>,
    /// Largest number of identical instances placed side by side.
    #[serde(default = "default_max_objs_in_pack")]
    pub max_objs_in_pack: u32,
    /// Probability that a shelf region (other than the first) is left empty.
    #[serde(default)]
    pub skip_shelf_probability: f64,
    #[serde(default)]
    pub seed: u64,
    /// Dataset timestamp, `%Y_%m_%d_%H_%M_%S`.
    #[serde(default)]
    pub stamp: Option<String>,
    /// Index of the first generated image (used to keep worker outputs disjoint).
    #[serde(default)]
    pub image_index_offset: usize,
    /// Fill shelf regions concurrently when feature "parallel" is on.
    #[serde(default = "default_parallel_regions")]
    pub parallel_regions: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            nomask_categories: Vec::new(),
            rotation_probability: default_rotation_probability(),
            max_x_offset: default_max_x_offset(),
            obj_sizes_allowed: default_obj_sizes(),
            max_objs_in_pack: default_max_objs_in_pack(),
            skip_shelf_probability: 0.0,
            seed: 0,
            stamp: None,
            image_index_offset: 0,
            parallel_regions: default_parallel_regions(),
        }
    }
}

impl GenerateOptions {
    /// Validates the options.
    ///
    /// Returns an error if:
    /// - a probability lies outside `[0, 1]`
    /// - `max_x_offset` or `max_objs_in_pack` is zero
    /// - no size factor or no category is allowed
    /// - `stamp` would not make a valid directory name
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::SynthError;

        for (name, p) in [
            ("rotation_probability", self.rotation_probability),
            ("skip_shelf_probability", self.skip_shelf_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(SynthError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }

        // A zero gap would let the cursor stall on zero-width draws
        if self.max_x_offset == 0 {
            return Err(SynthError::InvalidConfig(
                "max_x_offset must be at least 1".into(),
            ));
        }
        if self.max_objs_in_pack == 0 {
            return Err(SynthError::InvalidConfig(
                "max_objs_in_pack must be at least 1".into(),
            ));
        }
        if self.obj_sizes_allowed.is_empty() {
            return Err(SynthError::InvalidConfig(
                "obj_sizes_allowed must not be empty".into(),
            ));
        }
        if self.categories.is_empty() && self.nomask_categories.is_empty() {
            return Err(SynthError::InvalidConfig(
                "at least one foreground category is required".into(),
            ));
        }
        if let Some(stamp) = &self.stamp {
            if stamp.is_empty() || stamp.contains(['/', '\\']) {
                return Err(SynthError::InvalidConfig(format!(
                    "stamp '{stamp}' is not a valid directory component"
                )));
            }
        }
        Ok(())
    }

    /// Union of annotated and no-mask categories, deduplicated, in declaration order.
    pub fn category_pool(&self) -> Vec<String> {
        let mut pool: Vec<String> = Vec::with_capacity(
            self.categories.len() + self.nomask_categories.len(),
        );
        for c in self.categories.iter().chain(self.nomask_categories.iter()) {
            if !pool.contains(c) {
                pool.push(c.clone());
            }
        }
        pool
    }

    pub fn is_nomask(&self, category: &str) -> bool {
        self.nomask_categories.iter().any(|c| c == category)
    }
}

fn default_categories() -> Vec<String> {
    vec!["bottles".to_string()]
}
fn default_rotation_probability() -> f64 {
    0.1
}
fn default_max_x_offset() -> u32 {
    1
}
fn default_obj_sizes() -> Vec<ObjectSize> {
    ObjectSize::ALL.to_vec()
}
fn default_max_objs_in_pack() -> u32 {
    3
}
fn default_parallel_regions() -> bool {
    true
}

/// Builder for `GenerateOptions` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct GenerateOptionsBuilder {
    opts: GenerateOptions,
}

impl GenerateOptionsBuilder {
    pub fn new() -> Self {
        Self {
            opts: GenerateOptions::default(),
        }
    }
    pub fn categories<I, S>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.categories = v.into_iter().map(Into::into).collect();
        self
    }
    pub fn nomask_categories<I, S>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.nomask_categories = v.into_iter().map(Into::into).collect();
        self
    }
    pub fn rotation_probability(mut self, v: f64) -> Self {
        self.opts.rotation_probability = v;
        self
    }
    pub fn max_x_offset(mut self, v: u32) -> Self {
        self.opts.max_x_offset = v;
        self
    }
    pub fn obj_sizes_allowed(mut self, v: Vec<ObjectSize>) -> Self {
        self.opts.obj_sizes_allowed = v;
        self
    }
    pub fn max_objs_in_pack(mut self, v: u32) -> Self {
        self.opts.max_objs_in_pack = v;
        self
    }
    pub fn skip_shelf_probability(mut self, v: f64) -> Self {
        self.opts.skip_shelf_probability = v;
        self
    }
    pub fn seed(mut self, v: u64) -> Self {
        self.opts.seed = v;
        self
    }
    pub fn stamp(mut self, v: impl Into<String>) -> Self {
        self.opts.stamp = Some(v.into());
        self
    }
    pub fn image_index_offset(mut self, v: usize) -> Self {
        self.opts.image_index_offset = v;
        self
    }
    pub fn parallel_regions(mut self, v: bool) -> Self {
        self.opts.parallel_regions = v;
        self
    }
    pub fn build(self) -> GenerateOptions {
        self.opts
    }
}

impl GenerateOptions {
    /// Create a fluent builder for `GenerateOptions`.
    pub fn builder() -> GenerateOptionsBuilder {
        GenerateOptionsBuilder::new()
    }
}
