//! Writes the per-group artifact set under a parameter-named directory.
//!
//! One directory per parameter combination; runs that share parameters append
//! their groups' files to the same directory. Figures land next to the
//! serialized arrays so a result set is self-contained.

use crate::analysis::PipelineResult;
use crate::config::RunConfig;
use crate::data::EvaluationGroup;
use crate::render::{self, RenderError};
use log::{info, warn};
use ndarray::Array2;
use ndarray_npy::{WriteNpyError, WriteNpyExt, write_npy};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("failed to create output directory '{path}': {source}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write array '{path}': {source}")]
    WriteArray {
        path: String,
        #[source]
        source: WriteNpyError,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Saves one group's figure (SVG and PNG), the invoking arguments and the six
/// numeric artifacts.
///
/// Returns the artifact directory, or `None` when the output root collides
/// with an existing plain file; the collision is logged and the run carries on
/// with the remaining groups.
pub fn save_group_results(
    config: &RunConfig,
    group: &EvaluationGroup,
    result: &PipelineResult,
    svg: &str,
) -> Result<Option<PathBuf>, PersistError> {
    if config.output_root.is_file() {
        warn!(
            "output root '{}' is an existing file; skipping artifacts for group {}",
            config.output_root.display(),
            group.label
        );
        return Ok(None);
    }

    let directory = config.output_root.join(config.artifact_dir_name());
    fs::create_dir_all(&directory).map_err(|source| PersistError::CreateDir {
        path: directory.display().to_string(),
        source,
    })?;

    let label = group.label;
    write_text(&directory.join(format!("cls-{label}.svg")), svg)?;
    render::render_figure_png(&directory.join(format!("cls-{label}.png")), group, result, config)?;
    write_text(&directory.join("callparams.args"), &config.args_line())?;

    write_array(&directory.join(format!("emb-{label}.npy")), &result.embedding)?;
    write_array(
        &directory.join(format!("clust-{label}.npy")),
        &stacked_clusterings(result, group.len()),
    )?;
    write_array(&directory.join(format!("idx-{label}.npy")), &group.sample_indices)?;
    write_array(&directory.join(format!("adata-{label}.npy")), &group.analyzed)?;
    write_array(&directory.join(format!("inputs-{label}.npy")), &group.inputs)?;
    write_array(
        &directory.join(format!("relevances-{label}.npy")),
        &group.relevances,
    )?;

    info!("group {label}: artifacts saved under '{}'", directory.display());
    Ok(Some(directory))
}

/// Writes rendered SVG figures into a process-scoped directory under the
/// system temp dir and logs their paths. A batch CLI has no interactive
/// display; this is what an explicit preview request produces instead.
pub fn preview_figures(figures: &[(usize, String)]) -> Result<(), PersistError> {
    if figures.is_empty() {
        return Ok(());
    }
    let directory = std::env::temp_dir().join(format!("spray-figures-{}", std::process::id()));
    fs::create_dir_all(&directory).map_err(|source| PersistError::CreateDir {
        path: directory.display().to_string(),
        source,
    })?;
    for (label, svg) in figures {
        let path = directory.join(format!("cls-{label}.svg"));
        write_text(&path, svg)?;
        info!("figure for group {label}: {}", path.display());
    }
    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<(), PersistError> {
    fs::write(path, content).map_err(|source| PersistError::WriteFile {
        path: path.display().to_string(),
        source,
    })
}

fn write_array<T: WriteNpyExt>(path: &Path, array: &T) -> Result<(), PersistError> {
    write_npy(path, array).map_err(|source| PersistError::WriteArray {
        path: path.display().to_string(),
        source,
    })
}

/// The clusterings as one `[n_k, m]` integer matrix, ascending k per row.
fn stacked_clusterings(result: &PipelineResult, samples: usize) -> Array2<i64> {
    let mut stacked = Array2::zeros((result.clusterings.len(), samples));
    for (mut row, labels) in stacked.rows_mut().into_iter().zip(&result.clusterings) {
        for (slot, &label) in row.iter_mut().zip(labels.iter()) {
            *slot = label as i64;
        }
    }
    stacked
}
