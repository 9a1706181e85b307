//! Per-group driver for the spectral analysis pipeline.
//!
//! Translates the run configuration into one concrete [`Pipeline`] per
//! evaluation group and extracts the standardized outputs: one clustering per
//! candidate cluster count plus the mean-centered 2D projection.

use crate::config::RunConfig;
use crate::data::EvaluationGroup;
use crate::pipeline::{FanOut, Pipeline, PipelineError, Value};
use crate::stages::{
    EigenEmbedding, Flatten, KMeansClustering, NeighborhoodAffinity, Normalize,
    NormalizedAdjacency, PairwiseDistances, TSneEmbedding,
};
use log::info;
use ndarray::{Array1, Array2, Axis};
use std::time::Instant;

/// The standardized outputs of one group's pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    /// One label vector per candidate cluster count, in ascending k order.
    pub clusterings: Vec<Array1<usize>>,
    /// 2D projection of the samples, re-centered to zero mean.
    pub embedding: Array2<f64>,
}

/// Runs the spectral analysis over one group's analyzed data.
///
/// The pipeline is normalize, flatten, pairwise distances, k-nearest-neighbor
/// affinity, normalized spectral operator, eigenvector embedding, then a
/// fan-out that clusters the spectral embedding once per candidate cluster
/// count and projects it to 2D with t-SNE. Errors from any stage abort the
/// group.
pub fn run_spectral_analysis(
    group: &EvaluationGroup,
    config: &RunConfig,
) -> Result<PipelineResult, PipelineError> {
    let started = Instant::now();

    let mut outputs = FanOut::new("outputs");
    for clusters in config.cluster_counts() {
        outputs = outputs.branch(KMeansClustering {
            clusters,
            seed: config.random_seed,
        });
    }
    let outputs = outputs.branch(TSneEmbedding {
        perplexity: config.tsne_perplexity,
        seed: config.random_seed,
    });

    let pipeline = Pipeline::new()
        .then(Normalize {
            mode: config.normalization,
        })
        .then(Flatten)
        .then(PairwiseDistances)
        .then(NeighborhoodAffinity {
            neighbors: config.neighbors_affinity,
        })
        .then(NormalizedAdjacency)
        .then(EigenEmbedding {
            dimensions: config.number_eigen,
        })
        .then_collect(outputs);

    let collected = pipeline.run(Value::Data(group.analyzed.clone()))?;
    let mut gathered = Vec::new();
    for value in collected {
        gathered = value.into_collection("outputs")?;
    }

    // The fan-out gathers the k-means branches first, the t-SNE branch last.
    let branch_count = gathered.len();
    let mut clusterings = Vec::with_capacity(branch_count.saturating_sub(1));
    let mut embedding = Array2::zeros((0, 2));
    for (position, value) in gathered.into_iter().enumerate() {
        if position + 1 == branch_count {
            embedding = value.into_matrix("outputs")?;
        } else {
            clusterings.push(value.into_labels("outputs")?);
        }
    }

    if let Some(means) = embedding.mean_axis(Axis(0)) {
        embedding -= &means;
    }

    info!(
        "group {}: spectral analysis of {} samples finished in {:.2?}",
        group.label,
        group.len(),
        started.elapsed()
    );

    Ok(PipelineResult {
        clusterings,
        embedding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmap::ColorMap;
    use crate::config::{
        AnalysisData, AnalysisGrouping, AttributionType, FoldSelector, GroupSelector, Model,
        NormalizationMode,
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{ArrayD, IxDyn};
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn analysis_config(min_clusters: usize, max_clusters: usize) -> RunConfig {
        RunConfig {
            random_seed: 11,
            analysis_groups: AnalysisGrouping::All,
            group_index: GroupSelector::All,
            analysis_data: AnalysisData::Relevance,
            attribution_type: AttributionType::Act,
            input_root: PathBuf::from("."),
            model: Model::Cnn1DC8,
            fold: FoldSelector::Single(0),
            min_clusters,
            max_clusters,
            neighbors_affinity: 3,
            number_eigen: 3,
            tsne_perplexity: 2.0,
            normalization: NormalizationMode::BatchSum,
            cmap_injury: ColorMap::from_name("custom").unwrap(),
            cmap_subject: ColorMap::from_name("viridis").unwrap(),
            cmap_clustering: ColorMap::from_name("Set2").unwrap(),
            output_root: PathBuf::from("."),
            show: false,
            save_results: false,
        }
    }

    fn two_blob_group(samples: usize) -> EvaluationGroup {
        let features = 4;
        let analyzed = ArrayD::from_shape_fn(IxDyn(&[samples, features]), |idx| {
            let base = if idx[0] < samples / 2 { 1.0 } else { 50.0 };
            base + (idx[0] * features + idx[1]) as f64 * 0.01
        });
        EvaluationGroup {
            label: 0,
            analyzed: analyzed.clone(),
            injury_labels: Array2::zeros((samples, 4)),
            health_labels: Array2::zeros((samples, 2)),
            subject_labels: Array2::zeros((samples, 3)),
            sample_indices: (0..samples as i64).collect(),
            inputs: analyzed.clone(),
            relevances: analyzed,
        }
    }

    #[test]
    fn produces_one_clustering_per_candidate_count_and_a_centered_embedding() {
        let group = two_blob_group(12);
        let config = analysis_config(2, 4);
        let result = run_spectral_analysis(&group, &config).unwrap();

        assert_eq!(result.clusterings.len(), 3);
        for (offset, labels) in result.clusterings.iter().enumerate() {
            assert_eq!(labels.len(), 12);
            let distinct: BTreeSet<usize> = labels.iter().copied().collect();
            assert!(
                distinct.len() <= 2 + offset,
                "clustering {} has {} distinct labels",
                offset,
                distinct.len()
            );
        }

        assert_eq!(result.embedding.shape(), &[12, 2]);
        let means = result.embedding.mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(means[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(means[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn an_empty_cluster_range_still_yields_the_embedding() {
        let group = two_blob_group(12);
        let config = analysis_config(4, 3);
        let result = run_spectral_analysis(&group, &config).unwrap();

        assert!(result.clusterings.is_empty());
        assert_eq!(result.embedding.shape(), &[12, 2]);
    }

    #[test]
    fn pipeline_errors_propagate_to_the_caller() {
        let group = two_blob_group(4);
        // Requesting more eigenvectors than samples fails in the embedding
        // stage.
        let mut config = analysis_config(2, 2);
        config.number_eigen = 4;
        match run_spectral_analysis(&group, &config) {
            Err(PipelineError::InvalidParameter { stage, .. }) => assert_eq!(stage, "embedding"),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }
}
