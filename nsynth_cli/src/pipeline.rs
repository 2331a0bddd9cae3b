use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use dataset::{DatasetConfig, InstrumentFamily, NoteRecord};
use futures::StreamExt;
use ndarray::Array2;
use process::{FeatureExtractor, FeatureVector};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct FeatureRow {
    pub note_str: String,
    pub family: InstrumentFamily,
    pub features: FeatureVector,
}

/// Decodes and featurizes every record on the blocking pool.
///
/// At most `jobs` notes are in flight; rows come back in record order.
#[instrument(skip_all, fields(root = %root.display(), n_notes = records.len()))]
pub async fn featurize(
    root: PathBuf,
    config: DatasetConfig,
    records: Vec<NoteRecord>,
    extractor: FeatureExtractor,
    jobs: usize,
) -> anyhow::Result<Vec<FeatureRow>> {
    let start = std::time::Instant::now();
    let root = Arc::new(root);
    let config = Arc::new(config);
    let total = records.len();

    let mut tasks = futures::stream::iter(records.into_iter().map(|record| {
        let root = root.clone();
        let config = config.clone();
        let extractor = extractor.clone();
        tokio::task::spawn_blocking(move || featurize_note(&root, &config, &extractor, record))
    }))
    .buffered(jobs.max(1));

    let mut rows = Vec::with_capacity(total);
    while let Some(joined) = tasks.next().await {
        let row = joined
            .context("featurization task failed")
            .and_then(|row| row);
        match row {
            Ok(row) => rows.push(row),
            Err(err) => {
                // blocking tasks already started cannot be cancelled; they
                // finish detached and their rows are dropped
                warn!(done = rows.len(), total, error = %err, "stopping featurization");
                return Err(err);
            }
        }
        if rows.len() % 1000 == 0 {
            info!(done = rows.len(), total, "featurizing");
        }
    }

    let elapsed = start.elapsed();
    info!(?elapsed, n_rows = rows.len(), "featurized notes");
    Ok(rows)
}

fn featurize_note(
    root: &std::path::Path,
    config: &DatasetConfig,
    extractor: &FeatureExtractor,
    record: NoteRecord,
) -> anyhow::Result<FeatureRow> {
    let note = dataset::load_note(root, config, &record)
        .with_context(|| format!("failed to load note {}", record.note_str))?;
    let features = extractor
        .extract(&record.metadata(), &note.samples)
        .with_context(|| format!("failed to extract features for {}", record.note_str))?;
    debug!(note = %record.note_str, len = features.len(), "extracted features");

    Ok(FeatureRow {
        note_str: record.note_str,
        family: record.instrument_family,
        features,
    })
}

/// Stacks rows into a feature matrix and label vector.
pub fn to_matrix(rows: &[FeatureRow]) -> anyhow::Result<(Array2<f64>, Vec<usize>)> {
    let width = rows.first().map_or(0, |row| row.features.len());
    if let Some(bad) = rows.iter().find(|row| row.features.len() != width) {
        anyhow::bail!(
            "feature rows have differing lengths: {} has {}, expected {width}",
            bad.note_str,
            bad.features.len()
        );
    }
    let data: Vec<f64> = rows
        .iter()
        .flat_map(|row| row.features.iter().map(|&v| v as f64))
        .collect();
    let x = Array2::from_shape_vec((rows.len(), width), data)
        .context("failed to build feature matrix")?;
    let y = rows.iter().map(|row| row.family.id() as usize).collect();
    Ok((x, y))
}
