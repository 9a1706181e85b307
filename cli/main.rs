#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::Parser;
use log::info;
use std::error::Error;
use std::path::PathBuf;
use std::process;

use spray::analysis::run_spectral_analysis;
use spray::config::{
    AnalysisData, AnalysisGrouping, AttributionType, ConfigError, FoldSelector, GroupSelector,
    Model, NormalizationMode, RunConfig, parse_color_map, parse_seed,
};
use spray::data::load_analysis_data;
use spray::persist::{preview_figures, save_group_results};
use spray::render::render_figure_svg;

#[derive(Parser)]
#[command(
    name = "spray",
    about = "Spectral relevance analysis of gait classifier attributions",
    long_about = "Loads precomputed per-sample predictions and relevance attributions, partitions \
                  the samples into evaluation groups, runs a spectral clustering and embedding \
                  pipeline per group, and renders comparison scatterplots against the \
                  ground-truth labels."
)]
struct Cli {
    /// Random seed for k-means and t-SNE (hex/octal/binary/decimal literal)
    #[arg(long, alias = "rs", default_value = "0xDEADBEEF")]
    random_seed: String,

    /// How samples are grouped for analysis: ground_truth, as_predicted or all
    #[arg(long, alias = "ag", default_value = "ground_truth")]
    analysis_groups: String,

    /// Restrict the run to one group label, or 'all'
    #[arg(long, alias = "gi", default_value = "all")]
    group_index: String,

    /// What to analyze: relevance or inputs
    #[arg(long, alias = "ad", default_value = "relevance")]
    analysis_data: String,

    /// Attribution variant: dom (dominant class) or act (actual class)
    #[arg(long, alias = "at", default_value = "act")]
    attribution_type: String,

    /// Project root holding the persisted dataset arrays
    #[arg(
        long,
        alias = "ir",
        default_value = "./data_metaanalysis/2019_frontiers_small_dataset_v3_aff-unaff-atMM_1-234_"
    )]
    input_root: PathBuf,

    /// Model whose outputs are analyzed
    #[arg(long, short = 'm', default_value = "Cnn1DC8")]
    model: String,

    /// Fold identifier 0..9, or 'all' for every fold
    #[arg(long, short = 'f', default_value = "0")]
    fold: String,

    /// Smallest candidate cluster count
    #[arg(long, alias = "mc", default_value = "3")]
    min_clusters: usize,

    /// Largest candidate cluster count (inclusive)
    #[arg(long, alias = "MC", default_value = "8")]
    max_clusters: usize,

    /// Neighbor count for the affinity graph
    #[arg(long, alias = "na", default_value = "3")]
    neighbors_affinity: usize,

    /// Number of eigenvectors kept in the spectral embedding
    #[arg(long, alias = "neig", default_value = "8")]
    number_eigen: usize,

    /// t-SNE perplexity for the 2D projection
    #[arg(long, alias = "tp", default_value = "30.0")]
    tsne_perplexity: f64,

    /// Feature scaling before analysis: batch_sum (historical) or per_sample
    #[arg(long, default_value = "batch_sum")]
    normalization: String,

    /// Color map for the ground-truth injury panel
    #[arg(long, alias = "cmapi", default_value = "custom")]
    cmap_injury: String,

    /// Color map for the subject panel
    #[arg(long, alias = "cmaps", default_value = "viridis")]
    cmap_subject: String,

    /// Color map for the clustering panels
    #[arg(long, alias = "cmapc", default_value = "Set2")]
    cmap_clustering: String,

    /// Root directory for saved artifacts
    #[arg(
        long = "output",
        short = 'o',
        alias = "or",
        default_value = "./output_metaanalysis/2019_frontiers_small_dataset_v3_aff-unaff-atMM_1-234_"
    )]
    output_root: PathBuf,

    /// Write rendered figures to a temp directory and log their paths
    #[arg(long, short = 's')]
    show: bool,

    /// Save figures, parameters and numeric artifacts under the output root
    #[arg(long, alias = "sr")]
    save_results: bool,
}

/// Validates every selector against its closed vocabulary before any data is
/// touched.
fn build_config(cli: Cli) -> Result<RunConfig, ConfigError> {
    Ok(RunConfig {
        random_seed: parse_seed(&cli.random_seed)?,
        analysis_groups: AnalysisGrouping::parse(&cli.analysis_groups)?,
        group_index: GroupSelector::parse(&cli.group_index)?,
        analysis_data: AnalysisData::parse(&cli.analysis_data)?,
        attribution_type: AttributionType::parse(&cli.attribution_type)?,
        input_root: cli.input_root,
        model: Model::parse(&cli.model)?,
        fold: FoldSelector::parse(&cli.fold)?,
        min_clusters: cli.min_clusters,
        max_clusters: cli.max_clusters,
        neighbors_affinity: cli.neighbors_affinity,
        number_eigen: cli.number_eigen,
        tsne_perplexity: cli.tsne_perplexity,
        normalization: NormalizationMode::parse(&cli.normalization)?,
        cmap_injury: parse_color_map("cmap_injury", &cli.cmap_injury)?,
        cmap_subject: parse_color_map("cmap_subject", &cli.cmap_subject)?,
        cmap_clustering: parse_color_map("cmap_clustering", &cli.cmap_clustering)?,
        output_root: cli.output_root,
        show: cli.show,
        save_results: cli.save_results,
    })
}

fn run(config: RunConfig) -> Result<(), Box<dyn Error>> {
    info!(
        "loading {} data for model {} (fold {}, grouped by {})",
        config.data_description(),
        config.model,
        config.fold,
        config.analysis_groups
    );
    let groups = load_analysis_data(&config)?;
    info!("{} evaluation group(s) loaded", groups.len());

    let mut previews = Vec::new();
    for group in &groups {
        if !config.group_index.includes(group.label) {
            info!(
                "group {} skipped, only group index {} is analyzed",
                group.label, config.group_index
            );
            continue;
        }

        info!("group {}: analyzing {} samples", group.label, group.len());
        let result = run_spectral_analysis(group, &config)?;
        let svg = render_figure_svg(group, &result, &config)?;
        if config.save_results {
            save_group_results(&config, group, &result, &svg)?;
        }
        if config.show {
            previews.push((group.label, svg));
        }
    }

    preview_figures(&previews)?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match build_config(cli) {
        Ok(config) => run(config),
        Err(error) => Err(error.into()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
