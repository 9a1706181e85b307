//! The numeric stages the spectral analysis pipeline is assembled from.
//!
//! Preprocessing (normalization, flattening) feeds a dense Euclidean distance
//! matrix, which is thinned into a symmetric k-nearest-neighbor affinity
//! graph, rescaled into the normalized spectral operator, and decomposed into
//! the leading eigenvector embedding. Clustering and the 2D projection both
//! run on that spectral embedding.

use crate::config::NormalizationMode;
use crate::pipeline::{PipelineError, Stage, Value};
use linfa::DatasetBase;
use linfa::traits::{Fit, Predict, Transformer};
use linfa_clustering::KMeans;
use linfa_tsne::TSneParams;
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::cmp::Ordering;

/// Barnes-Hut accuracy/speed trade-off for the t-SNE branch.
const BARNES_HUT_THETA: f64 = 0.5;

/// Rescales the analyzed batch before any geometry is computed.
///
/// `BatchSum` divides every element by the grand total of the whole batch.
/// That matches the stored result sets, although each sample's features were
/// meant to be divided by that sample's own sum; `PerSample` is that
/// corrected variant.
pub struct Normalize {
    pub mode: NormalizationMode,
}

impl Stage for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let mut data = input.into_data(self.name())?;
        if data.shape().first().copied().unwrap_or(0) == 0 {
            return Err(PipelineError::EmptyInput { stage: self.name() });
        }
        match self.mode {
            NormalizationMode::BatchSum => {
                let total = data.sum();
                data.mapv_inplace(|value| value / total);
            }
            NormalizationMode::PerSample => {
                for mut sample in data.outer_iter_mut() {
                    let total = sample.sum();
                    sample.mapv_inplace(|value| value / total);
                }
            }
        }
        Ok(Value::Data(data))
    }
}

/// Collapses all feature dimensions into one vector per sample.
pub struct Flatten;

impl Stage for Flatten {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let data = input.into_data(self.name())?;
        let samples = data.shape().first().copied().unwrap_or(0);
        if samples == 0 {
            return Err(PipelineError::EmptyInput { stage: self.name() });
        }
        let features = data.len() / samples;
        let matrix = data
            .into_shape((samples, features))
            .map_err(|source| PipelineError::Reshape {
                stage: self.name(),
                source,
            })?;
        Ok(Value::Matrix(matrix))
    }
}

/// Dense pairwise Euclidean distances between all sample rows.
pub struct PairwiseDistances;

impl Stage for PairwiseDistances {
    fn name(&self) -> &'static str {
        "distance"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let matrix = input.into_matrix(self.name())?;
        let samples = matrix.nrows();
        let squared_norms = matrix.map_axis(Axis(1), |row| row.dot(&row));
        let gram = matrix.dot(&matrix.t());
        let mut distances = Array2::zeros((samples, samples));
        for i in 0..samples {
            for j in 0..samples {
                let squared = squared_norms[i] + squared_norms[j] - 2.0 * gram[[i, j]];
                distances[[i, j]] = squared.max(0.0).sqrt();
            }
        }
        Ok(Value::Matrix(distances))
    }
}

/// Unit edges to each row's k nearest neighbors (self excluded), symmetrized
/// as `(A + Aᵀ) / 2`. The neighbor count is silently clamped to `n - 1`.
pub struct NeighborhoodAffinity {
    pub neighbors: usize,
}

impl Stage for NeighborhoodAffinity {
    fn name(&self) -> &'static str {
        "affinity"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let distances = input.into_matrix(self.name())?;
        let samples = distances.nrows();
        if samples == 0 {
            return Err(PipelineError::EmptyInput { stage: self.name() });
        }
        let neighbors = self.neighbors.min(samples - 1);
        let mut affinity = Array2::zeros((samples, samples));
        for (i, row) in distances.rows().into_iter().enumerate() {
            let mut order: Vec<usize> = (0..samples).collect();
            order.sort_by(|&a, &b| row[a].partial_cmp(&row[b]).unwrap_or(Ordering::Equal));
            // Rank 0 is the row itself (distance zero); ranks 1..=k are kept.
            for &j in order.iter().skip(1).take(neighbors) {
                affinity[[i, j]] = 1.0;
            }
        }
        let symmetric = (&affinity + &affinity.t()) / 2.0;
        Ok(Value::Matrix(symmetric))
    }
}

/// The symmetric normalized spectral operator `D^(-1/2) · A · D^(-1/2)`.
/// Degree-zero rows are left untouched instead of dividing by zero.
pub struct NormalizedAdjacency;

impl Stage for NormalizedAdjacency {
    fn name(&self) -> &'static str {
        "laplacian"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let mut operator = input.into_matrix(self.name())?;
        let inverse_sqrt_degrees = operator
            .sum_axis(Axis(1))
            .mapv(|degree| if degree > 0.0 { 1.0 / degree.sqrt() } else { 0.0 });
        for ((i, j), value) in operator.indexed_iter_mut() {
            *value *= inverse_sqrt_degrees[i] * inverse_sqrt_degrees[j];
        }
        Ok(Value::Matrix(operator))
    }
}

/// Eigendecomposition of the spectral operator. Keeps the eigenvectors of the
/// largest eigenvalues, in descending eigenvalue order, with rows rescaled to
/// unit length.
pub struct EigenEmbedding {
    pub dimensions: usize,
}

impl Stage for EigenEmbedding {
    fn name(&self) -> &'static str {
        "embedding"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let operator = input.into_matrix(self.name())?;
        let samples = operator.nrows();
        if samples == 0 {
            return Err(PipelineError::EmptyInput { stage: self.name() });
        }
        if self.dimensions >= samples {
            return Err(PipelineError::InvalidParameter {
                stage: self.name(),
                message: format!(
                    "{} eigenvectors were requested but only {} samples are available; \
                     the embedding dimension must stay below the sample count",
                    self.dimensions, samples
                ),
            });
        }
        if operator.iter().any(|value| !value.is_finite()) {
            return Err(PipelineError::NonFinite { stage: self.name() });
        }

        let (_, eigenvectors): (Array1<f64>, Array2<f64>) = operator
            .eigh(UPLO::Lower)
            .map_err(|source| PipelineError::Eigen {
                stage: self.name(),
                source,
            })?;

        // Eigenvalues come back in ascending order; the embedding wants the
        // top of the spectrum first.
        let mut embedding = Array2::zeros((samples, self.dimensions));
        for column in 0..self.dimensions {
            embedding
                .column_mut(column)
                .assign(&eigenvectors.column(samples - 1 - column));
        }
        for mut row in embedding.rows_mut() {
            let norm = row.dot(&row).sqrt().max(f64::EPSILON);
            row.mapv_inplace(|value| value / norm);
        }
        Ok(Value::Matrix(embedding))
    }
}

/// One k-means run over the spectral embedding, with an explicitly seeded
/// generator.
pub struct KMeansClustering {
    pub clusters: usize,
    pub seed: u64,
}

impl Stage for KMeansClustering {
    fn name(&self) -> &'static str {
        "kmeans"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let matrix = input.into_matrix(self.name())?;
        let samples = matrix.nrows();
        if samples == 0 {
            return Err(PipelineError::EmptyInput { stage: self.name() });
        }
        if self.clusters == 0 || self.clusters > samples {
            return Err(PipelineError::InvalidParameter {
                stage: self.name(),
                message: format!(
                    "{} clusters were requested for {} samples",
                    self.clusters, samples
                ),
            });
        }

        let rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let dataset = DatasetBase::from(matrix.clone());
        let model = KMeans::params_with_rng(self.clusters, rng)
            .fit(&dataset)
            .map_err(|source| PipelineError::KMeans {
                stage: self.name(),
                source,
            })?;
        let labels: Array1<usize> = model.predict(&matrix);
        Ok(Value::Labels(labels))
    }
}

/// The 2D Barnes-Hut t-SNE projection of the spectral embedding, with an
/// explicitly seeded generator.
pub struct TSneEmbedding {
    pub perplexity: f64,
    pub seed: u64,
}

impl Stage for TSneEmbedding {
    fn name(&self) -> &'static str {
        "tsne"
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let matrix = input.into_matrix(self.name())?;
        if matrix.nrows() == 0 {
            return Err(PipelineError::EmptyInput { stage: self.name() });
        }

        let rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let embedded = TSneParams::embedding_size_with_rng(2, rng)
            .perplexity(self.perplexity)
            .approx_threshold(BARNES_HUT_THETA)
            .transform(matrix)
            .map_err(|source| PipelineError::TSne {
                stage: self.name(),
                source,
            })?;
        Ok(Value::Matrix(embedded))
    }
}
