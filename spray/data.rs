//! # Data Loading and Grouping Module
//!
//! This module is the exclusive entry point for persisted experiment data.
//! It reads the `.npy` matrices of a project root (labels, raw inputs, fold
//! splits, per-fold model outputs and attributions), validates their shapes
//! and index ranges against each other, and partitions the selected samples
//! into the [`EvaluationGroup`]s the rest of the driver operates on.
//!
//! - Fixed layout: file names and the `Injury/GRF_AV` dataset segment are not
//!   configurable. Only the project root, the model and the fold vary.
//! - User-centric errors: failures are assumed to be wrong paths or stale
//!   exports. The `DataError` enum names the offending file or count so the
//!   problem can be fixed without reading this source.

use crate::config::{
    AnalysisData, AnalysisGrouping, AttributionType, FoldSelector, RunConfig,
};
use ndarray::{Array1, Array2, ArrayD, Axis};
use ndarray_npy::ReadNpyError;
use std::path::Path;
use thiserror::Error;

const TARGETS_FILE: &str = "targets.npy";
const INJURY_TYPES_FILE: &str = "targets_injurytypes.npy";
const SUBJECTS_FILE: &str = "subject_labels.npy";
const DATA_FILE: &str = "data.npy";
const PERMUTATION_FILE: &str = "permutation.npy";
const SPLITS_DIR: &str = "splits";
const PREDICTIONS_FILE: &str = "y_pred.npy";

/// The dataset segment between the project root and the per-model output
/// directories. Fixed for this experiment family.
pub const DATASET_SUBDIR: &str = "Injury/GRF_AV";

/// One partition of the loaded samples, keyed by a grouping label. All
/// per-sample arrays share the same leading dimension.
#[derive(Debug)]
pub struct EvaluationGroup {
    /// The grouping label value this partition was selected by.
    pub label: usize,
    /// The matrix handed to the spectral pipeline: either the attributions or
    /// the raw inputs, depending on the configured data kind.
    pub analyzed: ArrayD<f64>,
    /// One-hot ground-truth injury subtype labels, `[n, n_subtypes]`.
    pub injury_labels: Array2<f64>,
    /// One-hot ground-truth health labels, `[n, n_health]`.
    pub health_labels: Array2<f64>,
    /// One-hot subject identity labels, permutation-aligned, `[n, n_subjects]`.
    pub subject_labels: Array2<f64>,
    /// The original dataset indices of the group's samples.
    pub sample_indices: Array1<i64>,
    /// Raw input features for the group's samples.
    pub inputs: ArrayD<f64>,
    /// Relevance attributions for the group's samples.
    pub relevances: ArrayD<f64>,
}

impl EvaluationGroup {
    pub fn len(&self) -> usize {
        self.sample_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_indices.is_empty()
    }

    /// Injury subtype index per sample, decoded from the one-hot rows.
    pub fn injury_classes(&self) -> Array1<usize> {
        internal::argmax_rows(&self.injury_labels)
    }

    /// Subject index per sample, decoded from the one-hot rows.
    pub fn subject_classes(&self) -> Array1<usize> {
        internal::argmax_rows(&self.subject_labels)
    }
}

/// All data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("input root '{path}' was not found or is not a directory")]
    InputRootNotFound { path: String },
    #[error(
        "no fold split files were found under '{path}'. Expected at least '{SPLITS_DIR}/fold-0.npy'."
    )]
    MissingSplits { path: String },
    #[error("failed to read array '{path}': {source}")]
    ReadArray {
        path: String,
        #[source]
        source: ReadNpyError,
    },
    #[error("'{name}' holds {found} samples but {expected} were expected")]
    SampleCountMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error(
        "sample index {index} from the fold splits is out of range (the dataset holds {len} samples)"
    )]
    IndexOutOfRange { index: i64, len: usize },
    #[error(
        "attribution feature shape {found:?} does not match the input feature shape {expected:?}"
    )]
    FeatureShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("per-fold '{what}' arrays have incompatible shapes: {source}")]
    ShapeConflict {
        what: &'static str,
        #[source]
        source: ndarray::ShapeError,
    },
}

/// Loads the project data addressed by `config` and partitions it into one
/// [`EvaluationGroup`] per distinct grouping label, in ascending label order.
pub fn load_analysis_data(config: &RunConfig) -> Result<Vec<EvaluationGroup>, DataError> {
    let root = config.input_root.as_path();
    if !root.is_dir() {
        return Err(DataError::InputRootNotFound {
            path: root.display().to_string(),
        });
    }

    let folds = internal::resolve_folds(root, config.fold)?;

    let health: Array2<f64> = internal::read_array(&root.join(TARGETS_FILE))?;
    let injury_types: Array2<f64> = internal::read_array(&root.join(INJURY_TYPES_FILE))?;
    let subjects: Array2<f64> = internal::read_array(&root.join(SUBJECTS_FILE))?;
    let data: ArrayD<f64> = internal::read_array(&root.join(DATA_FILE))?;
    let permutation: Array1<i64> = internal::read_array(&root.join(PERMUTATION_FILE))?;

    let total = data.shape().first().copied().unwrap_or(0);
    internal::check_count(TARGETS_FILE, total, health.nrows())?;
    internal::check_count(INJURY_TYPES_FILE, total, injury_types.nrows())?;
    internal::check_count(SUBJECTS_FILE, total, subjects.nrows())?;
    internal::check_count(PERMUTATION_FILE, total, permutation.len())?;

    // Subject labels are stored in unpermuted order; realign them before any
    // split indexing happens.
    let permutation_indices = internal::checked_indices(&permutation, total)?;
    let permuted_subjects = subjects.select(Axis(0), &permutation_indices);

    let model_dir = root.join(DATASET_SUBDIR).join(config.model.as_str());
    let mut split_parts: Vec<Array1<i64>> = Vec::with_capacity(folds.len());
    let mut prediction_parts: Vec<Array2<f64>> = Vec::with_capacity(folds.len());
    let mut attribution_parts: Vec<ArrayD<f64>> = Vec::with_capacity(folds.len());
    for fold in &folds {
        let split: Array1<i64> =
            internal::read_array(&root.join(SPLITS_DIR).join(format!("fold-{fold}.npy")))?;
        let part_dir = model_dir.join(format!("part-{fold}"));
        let predictions: Array2<f64> = internal::read_array(&part_dir.join(PREDICTIONS_FILE))?;
        let attributions: ArrayD<f64> =
            internal::read_array(&part_dir.join(attribution_file(config.attribution_type)))?;
        internal::check_count(PREDICTIONS_FILE, split.len(), predictions.nrows())?;
        internal::check_count(
            "relevance attributions",
            split.len(),
            attributions.shape().first().copied().unwrap_or(0),
        )?;
        split_parts.push(split);
        prediction_parts.push(predictions);
        attribution_parts.push(attributions);
    }

    let split_indices = internal::concat_vectors(&split_parts);
    let predictions = internal::concat_matrices("y_pred", &prediction_parts)?;
    let attributions = internal::concat_dyn("attribution", &attribution_parts)?;

    if attributions.shape()[1..] != data.shape()[1..] {
        return Err(DataError::FeatureShapeMismatch {
            expected: data.shape()[1..].to_vec(),
            found: attributions.shape()[1..].to_vec(),
        });
    }

    let gathered = internal::checked_indices(&split_indices, total)?;
    let fold_health = health.select(Axis(0), &gathered);
    let fold_injury = injury_types.select(Axis(0), &gathered);
    let fold_subjects = permuted_subjects.select(Axis(0), &gathered);
    let fold_inputs = data.select(Axis(0), &gathered);

    let labels = match config.analysis_groups {
        AnalysisGrouping::AsPredicted => internal::argmax_rows(&predictions),
        AnalysisGrouping::GroundTruth => internal::argmax_rows(&fold_health),
        AnalysisGrouping::All => Array1::zeros(gathered.len()),
    };

    let mut groups = Vec::new();
    for label in internal::distinct_sorted(&labels) {
        let members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &value)| value == label)
            .map(|(position, _)| position)
            .collect();

        let inputs = fold_inputs.select(Axis(0), &members);
        let relevances = attributions.select(Axis(0), &members);
        let analyzed = match config.analysis_data {
            AnalysisData::Relevance => relevances.clone(),
            AnalysisData::Inputs => inputs.clone(),
        };

        groups.push(EvaluationGroup {
            label,
            analyzed,
            injury_labels: fold_injury.select(Axis(0), &members),
            health_labels: fold_health.select(Axis(0), &members),
            subject_labels: fold_subjects.select(Axis(0), &members),
            sample_indices: split_indices.select(Axis(0), &members),
            inputs,
            relevances,
        });
    }
    Ok(groups)
}

fn attribution_file(kind: AttributionType) -> String {
    format!("R_pred_{}_epsilon.npy", kind.as_str())
}

/// Internal module for shared loading and validation logic.
mod internal {
    use super::*;
    use itertools::Itertools;
    use ndarray_npy::ReadNpyExt;

    /// Reads one `.npy` file into the requested array type, attaching the
    /// path to any failure.
    pub(super) fn read_array<T: ReadNpyExt>(path: &Path) -> Result<T, DataError> {
        let file = std::fs::File::open(path).map_err(|e| DataError::ReadArray {
            path: path.display().to_string(),
            source: ReadNpyError::from(e),
        })?;
        T::read_npy(file).map_err(|source| DataError::ReadArray {
            path: path.display().to_string(),
            source,
        })
    }

    /// Which folds to analyze: the selected one, or every contiguous
    /// `fold-<f>.npy` present in the split table starting from zero.
    pub(super) fn resolve_folds(
        root: &Path,
        selector: FoldSelector,
    ) -> Result<Vec<usize>, DataError> {
        match selector {
            FoldSelector::Single(fold) => Ok(vec![fold as usize]),
            FoldSelector::All => {
                let splits = root.join(SPLITS_DIR);
                let folds: Vec<usize> = (0..)
                    .take_while(|fold| splits.join(format!("fold-{fold}.npy")).is_file())
                    .collect();
                if folds.is_empty() {
                    return Err(DataError::MissingSplits {
                        path: root.display().to_string(),
                    });
                }
                Ok(folds)
            }
        }
    }

    pub(super) fn check_count(
        name: &'static str,
        expected: usize,
        found: usize,
    ) -> Result<(), DataError> {
        if expected == found {
            Ok(())
        } else {
            Err(DataError::SampleCountMismatch {
                name,
                expected,
                found,
            })
        }
    }

    /// Validates raw `i64` indices against the sample count and converts them
    /// for `select`. Negative indices are rejected rather than wrapped.
    pub(super) fn checked_indices(
        indices: &Array1<i64>,
        len: usize,
    ) -> Result<Vec<usize>, DataError> {
        indices
            .iter()
            .map(|&index| {
                if index < 0 || index as usize >= len {
                    Err(DataError::IndexOutOfRange { index, len })
                } else {
                    Ok(index as usize)
                }
            })
            .collect()
    }

    pub(super) fn concat_vectors(parts: &[Array1<i64>]) -> Array1<i64> {
        let mut joined = Vec::with_capacity(parts.iter().map(|p| p.len()).sum());
        for part in parts {
            joined.extend(part.iter().copied());
        }
        Array1::from_vec(joined)
    }

    pub(super) fn concat_matrices(
        what: &'static str,
        parts: &[Array2<f64>],
    ) -> Result<Array2<f64>, DataError> {
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map_err(|source| DataError::ShapeConflict { what, source })
    }

    pub(super) fn concat_dyn(
        what: &'static str,
        parts: &[ArrayD<f64>],
    ) -> Result<ArrayD<f64>, DataError> {
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map_err(|source| DataError::ShapeConflict { what, source })
    }

    /// Row-wise argmax with ties resolved towards the first maximum.
    pub(super) fn argmax_rows(matrix: &Array2<f64>) -> Array1<usize> {
        let mut result = Array1::zeros(matrix.nrows());
        for (i, row) in matrix.rows().into_iter().enumerate() {
            let mut best = 0usize;
            let mut best_value = f64::NEG_INFINITY;
            for (j, &value) in row.iter().enumerate() {
                if value > best_value {
                    best = j;
                    best_value = value;
                }
            }
            result[i] = best;
        }
        result
    }

    pub(super) fn distinct_sorted(labels: &Array1<usize>) -> Vec<usize> {
        labels.iter().copied().sorted().dedup().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupSelector, Model, NormalizationMode, parse_color_map};
    use ndarray::{Array3, array};
    use ndarray_npy::write_npy;
    use tempfile::TempDir;

    const TOTAL: usize = 12;

    /// Writes a two-fold fixture with 12 root samples of which 8 appear in
    /// the splits: fold-0 holds the even indices 0..8, fold-1 the odd ones.
    /// Health class is `i % 2`, injury subtype `i % 4`, subject `i % 3`, and
    /// the permutation reverses the sample order.
    fn write_fixture(root: &Path) {
        let mut health = Array2::<f64>::zeros((TOTAL, 2));
        let mut injury = Array2::<f64>::zeros((TOTAL, 4));
        let mut subjects = Array2::<f64>::zeros((TOTAL, 3));
        for i in 0..TOTAL {
            health[[i, i % 2]] = 1.0;
            injury[[i, i % 4]] = 1.0;
            subjects[[i, i % 3]] = 1.0;
        }
        let data = Array3::<f64>::from_shape_fn((TOTAL, 3, 2), |(i, j, k)| {
            (i * 100 + j * 10 + k) as f64
        });
        let permutation: Array1<i64> = (0..TOTAL as i64).rev().collect();

        write_npy(root.join(TARGETS_FILE), &health).unwrap();
        write_npy(root.join(INJURY_TYPES_FILE), &injury).unwrap();
        write_npy(root.join(SUBJECTS_FILE), &subjects).unwrap();
        write_npy(root.join(DATA_FILE), &data).unwrap();
        write_npy(root.join(PERMUTATION_FILE), &permutation).unwrap();

        std::fs::create_dir_all(root.join(SPLITS_DIR)).unwrap();
        let model_dir = root.join(DATASET_SUBDIR).join("Cnn1DC8");
        for (fold, indices) in [(0i64, [0i64, 2, 4, 6]), (1, [1, 3, 5, 7])] {
            let split = Array1::from_vec(indices.to_vec());
            write_npy(
                root.join(SPLITS_DIR).join(format!("fold-{fold}.npy")),
                &split,
            )
            .unwrap();

            let part_dir = model_dir.join(format!("part-{fold}"));
            std::fs::create_dir_all(&part_dir).unwrap();
            let mut predictions = Array2::<f64>::zeros((indices.len(), 2));
            for (row, &index) in indices.iter().enumerate() {
                predictions[[row, (index % 2) as usize]] = 0.9;
                predictions[[row, 1 - (index % 2) as usize]] = 0.1;
            }
            write_npy(part_dir.join(PREDICTIONS_FILE), &predictions).unwrap();
            let attributions = Array3::<f64>::from_shape_fn(
                (indices.len(), 3, 2),
                |(i, j, k)| 1000.0 + (indices[i] * 100) as f64 + (j * 10 + k) as f64,
            );
            write_npy(part_dir.join("R_pred_act_epsilon.npy"), &attributions).unwrap();
        }
    }

    fn fixture_config(root: &Path) -> RunConfig {
        RunConfig {
            random_seed: 0,
            analysis_groups: AnalysisGrouping::GroundTruth,
            group_index: GroupSelector::All,
            analysis_data: AnalysisData::Relevance,
            attribution_type: AttributionType::Act,
            input_root: root.to_path_buf(),
            model: Model::Cnn1DC8,
            fold: FoldSelector::All,
            min_clusters: 3,
            max_clusters: 4,
            neighbors_affinity: 2,
            number_eigen: 3,
            tsne_perplexity: 2.0,
            normalization: NormalizationMode::BatchSum,
            cmap_injury: parse_color_map("cmap_injury", "custom").unwrap(),
            cmap_subject: parse_color_map("cmap_subject", "viridis").unwrap(),
            cmap_clustering: parse_color_map("cmap_clustering", "Set2").unwrap(),
            output_root: root.join("out"),
            show: false,
            save_results: false,
        }
    }

    #[test]
    fn ground_truth_grouping_partitions_by_health_class() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let groups = load_analysis_data(&fixture_config(dir.path())).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, 0);
        assert_eq!(groups[1].label, 1);
        assert_eq!(groups.iter().map(|g| g.len()).sum::<usize>(), 8);
        // Class 0 is exactly the even sample indices, in fold order.
        assert_eq!(groups[0].sample_indices, array![0i64, 2, 4, 6]);
        assert_eq!(groups[1].sample_indices, array![1i64, 3, 5, 7]);
    }

    #[test]
    fn all_grouping_yields_one_group_labeled_zero() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let mut config = fixture_config(dir.path());
        config.analysis_groups = AnalysisGrouping::All;
        let groups = load_analysis_data(&config).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, 0);
        assert_eq!(groups[0].len(), 8);
    }

    #[test]
    fn as_predicted_grouping_follows_the_prediction_argmax() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let mut config = fixture_config(dir.path());
        config.analysis_groups = AnalysisGrouping::AsPredicted;
        let groups = load_analysis_data(&config).unwrap();

        // The fixture's predictions agree with ground truth.
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].sample_indices, array![0i64, 2, 4, 6]);
    }

    #[test]
    fn inputs_data_kind_analyzes_the_raw_inputs() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let mut config = fixture_config(dir.path());
        config.analysis_data = AnalysisData::Inputs;
        let groups = load_analysis_data(&config).unwrap();

        for group in &groups {
            assert_eq!(group.analyzed, group.inputs);
            assert_ne!(group.analyzed, group.relevances);
        }
    }

    #[test]
    fn relevance_data_kind_analyzes_the_attributions() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let groups = load_analysis_data(&fixture_config(dir.path())).unwrap();

        let group = &groups[0];
        assert_eq!(group.analyzed, group.relevances);
        // Attribution values carry the 1000 offset baked into the fixture.
        assert!(group.relevances.iter().all(|&v| v >= 1000.0));
        assert!(group.inputs.iter().all(|&v| v < 1000.0));
    }

    #[test]
    fn subject_labels_are_realigned_through_the_permutation() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let groups = load_analysis_data(&fixture_config(dir.path())).unwrap();

        for group in &groups {
            for (row, &index) in group.sample_indices.iter().enumerate() {
                let expected_subject = ((TOTAL as i64 - 1 - index) % 3) as usize;
                let onehot = group.subject_labels.row(row);
                assert_eq!(onehot[expected_subject], 1.0);
            }
        }
    }

    #[test]
    fn single_fold_selector_loads_only_that_fold() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let mut config = fixture_config(dir.path());
        config.fold = FoldSelector::Single(1);
        let groups = load_analysis_data(&config).unwrap();

        let indices: Vec<i64> = groups
            .iter()
            .flat_map(|g| g.sample_indices.iter().copied())
            .collect();
        assert_eq!(indices.len(), 4);
        assert!(indices.iter().all(|i| i % 2 == 1));
    }

    #[test]
    fn missing_input_root_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut config = fixture_config(dir.path());
        config.input_root = dir.path().join("nowhere");
        match load_analysis_data(&config) {
            Err(DataError::InputRootNotFound { path }) => assert!(path.contains("nowhere")),
            other => panic!("expected InputRootNotFound, got {other:?}"),
        }
    }

    #[test]
    fn sample_count_mismatch_is_reported() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let truncated = Array2::<f64>::zeros((TOTAL - 1, 2));
        write_npy(dir.path().join(TARGETS_FILE), &truncated).unwrap();

        match load_analysis_data(&fixture_config(dir.path())) {
            Err(DataError::SampleCountMismatch {
                name,
                expected,
                found,
            }) => {
                assert_eq!(name, TARGETS_FILE);
                assert_eq!(expected, TOTAL);
                assert_eq!(found, TOTAL - 1);
            }
            other => panic!("expected SampleCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_split_index_is_reported() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let bad_split = array![0i64, 99];
        write_npy(dir.path().join(SPLITS_DIR).join("fold-0.npy"), &bad_split).unwrap();
        // Keep the per-fold arrays consistent with the new split length.
        let part_dir = dir.path().join(DATASET_SUBDIR).join("Cnn1DC8/part-0");
        write_npy(
            part_dir.join(PREDICTIONS_FILE),
            &array![[0.9, 0.1], [0.1, 0.9]],
        )
        .unwrap();
        write_npy(
            part_dir.join("R_pred_act_epsilon.npy"),
            &Array3::<f64>::zeros((2, 3, 2)),
        )
        .unwrap();

        let mut config = fixture_config(dir.path());
        config.fold = FoldSelector::Single(0);
        match load_analysis_data(&config) {
            Err(DataError::IndexOutOfRange { index, len }) => {
                assert_eq!(index, 99);
                assert_eq!(len, TOTAL);
            }
            other => panic!("expected IndexOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn missing_model_outputs_name_the_offending_file() {
        let dir = TempDir::new().unwrap();
        write_fixture(dir.path());
        let mut config = fixture_config(dir.path());
        config.model = Model::MlpLinear;
        match load_analysis_data(&config) {
            Err(DataError::ReadArray { path, .. }) => {
                assert!(path.contains("MlpLinear"), "unexpected path: {path}");
            }
            other => panic!("expected ReadArray, got {other:?}"),
        }
    }
}
