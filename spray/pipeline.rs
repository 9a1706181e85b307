//! The explicit stage pipeline the spectral analysis is built from.
//!
//! A [`Pipeline`] is a directed sequence of named [`Stage`]s. Each stage is a
//! pure function from one [`Value`] to the next; the runner threads values
//! through and clones out the results of the stages flagged for collection.
//! Fan-out over one intermediate (run several stages on the same input and
//! gather their results) is itself a stage, so the whole analysis stays a
//! single linear description.

use linfa_clustering::KMeansError;
use linfa_tsne::TSneError;
use log::debug;
use ndarray::{Array1, Array2, ArrayD};
use ndarray_linalg::error::LinalgError;
use std::time::Instant;
use thiserror::Error;

/// The payloads that flow between stages.
#[derive(Debug, Clone)]
pub enum Value {
    /// A sample-major array of arbitrary feature rank.
    Data(ArrayD<f64>),
    /// A two-dimensional matrix.
    Matrix(Array2<f64>),
    /// Per-sample integer labels.
    Labels(Array1<usize>),
    /// The gathered results of a fan-out stage.
    Collection(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Data(_) => "data",
            Value::Matrix(_) => "matrix",
            Value::Labels(_) => "labels",
            Value::Collection(_) => "collection",
        }
    }

    pub fn into_data(self, stage: &'static str) -> Result<ArrayD<f64>, PipelineError> {
        match self {
            Value::Data(data) => Ok(data),
            other => Err(PipelineError::TypeMismatch {
                stage,
                expected: "data",
                got: other.kind(),
            }),
        }
    }

    pub fn into_matrix(self, stage: &'static str) -> Result<Array2<f64>, PipelineError> {
        match self {
            Value::Matrix(matrix) => Ok(matrix),
            other => Err(PipelineError::TypeMismatch {
                stage,
                expected: "matrix",
                got: other.kind(),
            }),
        }
    }

    pub fn into_labels(self, stage: &'static str) -> Result<Array1<usize>, PipelineError> {
        match self {
            Value::Labels(labels) => Ok(labels),
            other => Err(PipelineError::TypeMismatch {
                stage,
                expected: "labels",
                got: other.kind(),
            }),
        }
    }

    pub fn into_collection(self, stage: &'static str) -> Result<Vec<Value>, PipelineError> {
        match self {
            Value::Collection(values) => Ok(values),
            other => Err(PipelineError::TypeMismatch {
                stage,
                expected: "collection",
                got: other.kind(),
            }),
        }
    }
}

/// Errors raised while running a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("stage '{stage}' expected a {expected} input but received {got}")]
    TypeMismatch {
        stage: &'static str,
        expected: &'static str,
        got: &'static str,
    },
    #[error("stage '{stage}' received an empty sample batch")]
    EmptyInput { stage: &'static str },
    #[error("stage '{stage}': {message}")]
    InvalidParameter {
        stage: &'static str,
        message: String,
    },
    #[error("stage '{stage}' produced non-finite values")]
    NonFinite { stage: &'static str },
    #[error("stage '{stage}' could not reshape its input: {source}")]
    Reshape {
        stage: &'static str,
        #[source]
        source: ndarray::ShapeError,
    },
    #[error("eigendecomposition failed in stage '{stage}': {source}")]
    Eigen {
        stage: &'static str,
        #[source]
        source: LinalgError,
    },
    #[error("k-means failed in stage '{stage}': {source}")]
    KMeans {
        stage: &'static str,
        #[source]
        source: KMeansError,
    },
    #[error("t-SNE failed in stage '{stage}': {source}")]
    TSne {
        stage: &'static str,
        #[source]
        source: TSneError,
    },
}

/// One named transformation step.
pub trait Stage {
    fn name(&self) -> &'static str;
    fn apply(&self, input: Value) -> Result<Value, PipelineError>;
}

struct Slot {
    stage: Box<dyn Stage>,
    collect: bool,
}

/// An ordered sequence of stages with a fixed set of collected outputs.
pub struct Pipeline {
    stages: Vec<Slot>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline { stages: Vec::new() }
    }

    /// Appends a stage whose output is only passed on.
    pub fn then(mut self, stage: impl Stage + 'static) -> Pipeline {
        self.stages.push(Slot {
            stage: Box::new(stage),
            collect: false,
        });
        self
    }

    /// Appends a stage whose output is also recorded in the run results.
    pub fn then_collect(mut self, stage: impl Stage + 'static) -> Pipeline {
        self.stages.push(Slot {
            stage: Box::new(stage),
            collect: true,
        });
        self
    }

    /// Threads `input` through every stage in order and returns the collected
    /// outputs. The first failing stage aborts the run.
    pub fn run(&self, input: Value) -> Result<Vec<Value>, PipelineError> {
        let mut value = input;
        let mut collected = Vec::new();
        for slot in &self.stages {
            let started = Instant::now();
            value = slot.stage.apply(value)?;
            debug!(
                "stage '{}' finished in {:.2?}",
                slot.stage.name(),
                started.elapsed()
            );
            if slot.collect {
                collected.push(value.clone());
            }
        }
        Ok(collected)
    }
}

impl Default for Pipeline {
    fn default() -> Pipeline {
        Pipeline::new()
    }
}

/// Runs every branch on a clone of the same input and gathers the branch
/// outputs into a [`Value::Collection`], in branch order.
pub struct FanOut {
    name: &'static str,
    branches: Vec<Box<dyn Stage>>,
}

impl FanOut {
    pub fn new(name: &'static str) -> FanOut {
        FanOut {
            name,
            branches: Vec::new(),
        }
    }

    pub fn branch(mut self, stage: impl Stage + 'static) -> FanOut {
        self.branches.push(Box::new(stage));
        self
    }
}

impl Stage for FanOut {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, input: Value) -> Result<Value, PipelineError> {
        let mut outputs = Vec::with_capacity(self.branches.len());
        for branch in &self.branches {
            outputs.push(branch.apply(input.clone())?);
        }
        Ok(Value::Collection(outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Scale(f64);

    impl Stage for Scale {
        fn name(&self) -> &'static str {
            "scale"
        }

        fn apply(&self, input: Value) -> Result<Value, PipelineError> {
            let matrix = input.into_matrix(self.name())?;
            Ok(Value::Matrix(matrix * self.0))
        }
    }

    struct RowCount;

    impl Stage for RowCount {
        fn name(&self) -> &'static str {
            "row_count"
        }

        fn apply(&self, input: Value) -> Result<Value, PipelineError> {
            let matrix = input.into_matrix(self.name())?;
            Ok(Value::Labels(Array1::from_elem(1, matrix.nrows())))
        }
    }

    #[test]
    fn runner_threads_values_and_collects_flagged_outputs() {
        let pipeline = Pipeline::new()
            .then(Scale(2.0))
            .then_collect(Scale(3.0))
            .then_collect(RowCount);
        let outputs = pipeline
            .run(Value::Matrix(array![[1.0, 2.0]]))
            .unwrap();

        assert_eq!(outputs.len(), 2);
        match &outputs[0] {
            Value::Matrix(matrix) => assert_eq!(matrix, &array![[6.0, 12.0]]),
            other => panic!("expected matrix, got {}", other.kind()),
        }
        match &outputs[1] {
            Value::Labels(labels) => assert_eq!(labels, &array![1usize]),
            other => panic!("expected labels, got {}", other.kind()),
        }
    }

    #[test]
    fn type_mismatch_names_the_stage_and_both_kinds() {
        let err = Pipeline::new()
            .then(Scale(2.0))
            .run(Value::Labels(array![1usize]))
            .unwrap_err();
        match err {
            PipelineError::TypeMismatch {
                stage,
                expected,
                got,
            } => {
                assert_eq!(stage, "scale");
                assert_eq!(expected, "matrix");
                assert_eq!(got, "labels");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn fan_out_broadcasts_the_same_input_to_every_branch() {
        let fan = FanOut::new("outputs")
            .branch(Scale(2.0))
            .branch(Scale(5.0))
            .branch(RowCount);
        let outputs = fan
            .apply(Value::Matrix(array![[1.0], [2.0]]))
            .unwrap()
            .into_collection("test")
            .unwrap();

        assert_eq!(outputs.len(), 3);
        match (&outputs[0], &outputs[1]) {
            (Value::Matrix(a), Value::Matrix(b)) => {
                assert_eq!(a, &array![[2.0], [4.0]]);
                assert_eq!(b, &array![[5.0], [10.0]]);
            }
            other => panic!("expected two matrices, got {other:?}"),
        }
    }
}
