//! Run configuration for the analysis driver.
//!
//! Every user-facing selector is a closed vocabulary parsed into an enum up
//! front, so the rest of the crate never touches raw argument strings. A
//! [`RunConfig`] is assembled once at startup and read-only afterwards; it also
//! owns the deterministic naming of the artifact directory.

use crate::cmap::ColorMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while validating command-line parameters.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "invalid value '{value}' for --{argument}. Allowed values: {allowed}."
    )]
    InvalidSelector {
        argument: &'static str,
        value: String,
        allowed: String,
    },
    #[error(
        "invalid random seed '{0}'. Expected a decimal, 0x…, 0o…, or 0b… integer literal."
    )]
    InvalidSeed(String),
}

/// The classifiers whose persisted outputs can be analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Cnn1DC8,
    Mlp3Layer768Unit,
    MlpLinear,
    SvmLinearL2C1em1,
}

impl Model {
    pub const ALL: [Model; 4] = [
        Model::Cnn1DC8,
        Model::Mlp3Layer768Unit,
        Model::MlpLinear,
        Model::SvmLinearL2C1em1,
    ];

    /// The exact spelling used both on the command line and in dataset paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Cnn1DC8 => "Cnn1DC8",
            Model::Mlp3Layer768Unit => "Mlp3Layer768Unit",
            Model::MlpLinear => "MlpLinear",
            Model::SvmLinearL2C1em1 => "SvmLinearL2C1em1",
        }
    }

    pub fn parse(text: &str) -> Result<Model, ConfigError> {
        Model::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == text)
            .ok_or_else(|| invalid("model", text, Model::ALL.map(|m| m.as_str()).join(", ")))
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which per-sample matrix is fed into the spectral pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisData {
    Relevance,
    Inputs,
}

impl AnalysisData {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisData::Relevance => "relevance",
            AnalysisData::Inputs => "inputs",
        }
    }

    pub fn parse(text: &str) -> Result<AnalysisData, ConfigError> {
        match text {
            "relevance" => Ok(AnalysisData::Relevance),
            "inputs" => Ok(AnalysisData::Inputs),
            other => Err(invalid("analysis_data", other, "relevance, inputs".into())),
        }
    }
}

impl fmt::Display for AnalysisData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which relevance variant to load: attributions for the dominant predicted
/// class or for the actually labeled class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionType {
    Dom,
    Act,
}

impl AttributionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionType::Dom => "dom",
            AttributionType::Act => "act",
        }
    }

    pub fn parse(text: &str) -> Result<AttributionType, ConfigError> {
        match text {
            "dom" => Ok(AttributionType::Dom),
            "act" => Ok(AttributionType::Act),
            other => Err(invalid("attribution_type", other, "dom, act".into())),
        }
    }
}

impl fmt::Display for AttributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for partitioning samples into evaluation groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisGrouping {
    GroundTruth,
    AsPredicted,
    All,
}

impl AnalysisGrouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisGrouping::GroundTruth => "ground_truth",
            AnalysisGrouping::AsPredicted => "as_predicted",
            AnalysisGrouping::All => "all",
        }
    }

    pub fn parse(text: &str) -> Result<AnalysisGrouping, ConfigError> {
        match text {
            "ground_truth" => Ok(AnalysisGrouping::GroundTruth),
            "as_predicted" => Ok(AnalysisGrouping::AsPredicted),
            "all" => Ok(AnalysisGrouping::All),
            other => Err(invalid(
                "analysis_groups",
                other,
                "ground_truth, as_predicted, all".into(),
            )),
        }
    }
}

impl fmt::Display for AnalysisGrouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the preprocessing stage rescales the analyzed matrix.
///
/// `BatchSum` divides every element by the grand total of the whole batch.
/// That is what the archived experiments computed, even though the intent was
/// a per-sample rescaling; `PerSample` divides each sample's features by that
/// sample's own sum instead. `BatchSum` stays the default so existing result
/// sets remain reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    BatchSum,
    PerSample,
}

impl NormalizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMode::BatchSum => "batch_sum",
            NormalizationMode::PerSample => "per_sample",
        }
    }

    pub fn parse(text: &str) -> Result<NormalizationMode, ConfigError> {
        match text {
            "batch_sum" => Ok(NormalizationMode::BatchSum),
            "per_sample" => Ok(NormalizationMode::PerSample),
            other => Err(invalid(
                "normalization",
                other,
                "batch_sum, per_sample".into(),
            )),
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cross-validation folds to analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldSelector {
    All,
    Single(u8),
}

impl FoldSelector {
    pub fn parse(text: &str) -> Result<FoldSelector, ConfigError> {
        if text == "all" {
            return Ok(FoldSelector::All);
        }
        match text.parse::<u8>() {
            Ok(f) if f <= 9 => Ok(FoldSelector::Single(f)),
            _ => Err(invalid("fold", text, "0..9, all".into())),
        }
    }
}

impl fmt::Display for FoldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldSelector::All => f.write_str("all"),
            FoldSelector::Single(fold) => write!(f, "{fold}"),
        }
    }
}

/// Restricts processing to one evaluation group, or keeps them all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSelector {
    All,
    Single(usize),
}

impl GroupSelector {
    pub fn parse(text: &str) -> Result<GroupSelector, ConfigError> {
        if text == "all" {
            return Ok(GroupSelector::All);
        }
        text.parse::<usize>()
            .map(GroupSelector::Single)
            .map_err(|_| invalid("group_index", text, "all, or a non-negative integer".into()))
    }

    pub fn includes(&self, label: usize) -> bool {
        match self {
            GroupSelector::All => true,
            GroupSelector::Single(wanted) => *wanted == label,
        }
    }
}

impl fmt::Display for GroupSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupSelector::All => f.write_str("all"),
            GroupSelector::Single(index) => write!(f, "{index}"),
        }
    }
}

/// Parses an integer literal the way the experiment scripts accepted seeds:
/// plain decimal or prefixed hex/octal/binary.
pub fn parse_seed(text: &str) -> Result<u64, ConfigError> {
    let trimmed = text.trim();
    let (digits, radix) = if let Some(hex) = strip_prefix_ci(trimmed, "0x") {
        (hex, 16)
    } else if let Some(oct) = strip_prefix_ci(trimmed, "0o") {
        (oct, 8)
    } else if let Some(bin) = strip_prefix_ci(trimmed, "0b") {
        (bin, 2)
    } else {
        (trimmed, 10)
    };
    u64::from_str_radix(digits, radix).map_err(|_| ConfigError::InvalidSeed(text.to_string()))
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

/// Resolves a color-map name against the closed vocabulary.
pub fn parse_color_map(argument: &'static str, text: &str) -> Result<ColorMap, ConfigError> {
    ColorMap::from_name(text)
        .ok_or_else(|| invalid(argument, text, ColorMap::NAMES.join(", ")))
}

fn invalid(argument: &'static str, value: &str, allowed: String) -> ConfigError {
    ConfigError::InvalidSelector {
        argument,
        value: value.to_string(),
        allowed,
    }
}

/// The complete, validated parameter set for one run. Assembled once from the
/// command line and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub random_seed: u64,
    pub analysis_groups: AnalysisGrouping,
    pub group_index: GroupSelector,
    pub analysis_data: AnalysisData,
    pub attribution_type: AttributionType,
    pub input_root: PathBuf,
    pub model: Model,
    pub fold: FoldSelector,
    pub min_clusters: usize,
    pub max_clusters: usize,
    pub neighbors_affinity: usize,
    pub number_eigen: usize,
    pub tsne_perplexity: f64,
    pub normalization: NormalizationMode,
    pub cmap_injury: ColorMap,
    pub cmap_subject: ColorMap,
    pub cmap_clustering: ColorMap,
    pub output_root: PathBuf,
    pub show: bool,
    pub save_results: bool,
}

impl RunConfig {
    /// The candidate cluster counts, in ascending order. Empty when
    /// `min_clusters > max_clusters`.
    pub fn cluster_counts(&self) -> Vec<usize> {
        (self.min_clusters..=self.max_clusters).collect()
    }

    /// A short description of the analyzed data for figure titles, e.g.
    /// `inputs` or `relevance act`.
    pub fn data_description(&self) -> String {
        match self.analysis_data {
            AnalysisData::Inputs => "inputs".to_string(),
            AnalysisData::Relevance => format!("relevance {}", self.attribution_type),
        }
    }

    /// The deterministic artifact directory name: the naturally sorted
    /// parameter values joined by `-`.
    ///
    /// The eigenvector count is deliberately not part of the name; runs that
    /// differ only in `number_eigen` (or in the normalization mode) land in
    /// the same directory, matching how previous result sets were organized.
    pub fn artifact_dir_name(&self) -> String {
        self.named_parameters()
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// One line recording the invoking parameters, written to
    /// `callparams.args` next to the saved artifacts.
    pub fn args_line(&self) -> String {
        self.named_parameters()
            .iter()
            .map(|(key, value)| format!("--{key} {value}"))
            .collect::<Vec<_>>()
            .join("  ")
    }

    fn named_parameters(&self) -> Vec<(&'static str, String)> {
        let mut entries = vec![
            ("random_seed", self.random_seed.to_string()),
            ("analysis_data", self.analysis_data.to_string()),
            ("analysis_groups", self.analysis_groups.to_string()),
            ("group_index", self.group_index.to_string()),
            ("attribution_type", self.attribution_type.to_string()),
            ("model", self.model.to_string()),
            ("fold", self.fold.to_string()),
            ("min_clusters", self.min_clusters.to_string()),
            ("max_clusters", self.max_clusters.to_string()),
            ("neighbors_affinity", self.neighbors_affinity.to_string()),
            ("tsne_perplexity", format_float(self.tsne_perplexity)),
            ("cmap_injury", self.cmap_injury.name().to_string()),
            ("cmap_subject", self.cmap_subject.name().to_string()),
            ("cmap_clustering", self.cmap_clustering.name().to_string()),
        ];
        entries.sort_by(|a, b| natord::compare(a.0, b.0));
        entries
    }
}

/// Formats a float the way the archived result directories spell them:
/// integral values keep one decimal place (`30.0`, not `30`).
fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
