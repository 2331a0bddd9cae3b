use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use clap::Parser;
use dataset::{split::train_test_split, Dataset, InstrumentFamily};
use process::FeatureExtractor;
use tracing::{debug, info, instrument};

mod config;
mod pipeline;
mod render;

use config::ExperimentConfig;
use pipeline::{featurize, to_matrix, FeatureRow};

#[derive(Debug, clap::Parser)]
#[command(version, about = "Instrument-family classification on NSynth notes")]
enum Command {
    /// Featurize, fit a Gaussian naive Bayes model and print a classification report
    Evaluate {
        /// NSynth split directory used for training
        #[arg(long)]
        train: PathBuf,
        /// Separate split for testing; without it the training split is divided
        #[arg(long)]
        test: Option<PathBuf>,
        #[arg(long)]
        test_fraction: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Write the report as JSON as well
        #[arg(long)]
        report_json: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write one JSON line of features per note
    Features {
        path: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Show one note's record and feature vector
    Inspect {
        path: PathBuf,
        note_str: String,
        /// Render the dB mel spectrogram to this PNG
        #[arg(long)]
        png: Option<PathBuf>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Print the effective configuration as TOML
    ShowConfig {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Debug, clap::Args)]
struct CommonArgs {
    /// TOML experiment configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Keep at most this many notes per split
    #[arg(long)]
    limit: Option<usize>,
    /// Only use these instrument families (repeatable)
    #[arg(long = "family", value_parser = parse_family)]
    families: Vec<InstrumentFamily>,
    #[arg(long)]
    n_mels: Option<usize>,
    /// Notes featurized concurrently
    #[arg(short, long)]
    jobs: Option<usize>,
}

impl CommonArgs {
    fn load_config(&self) -> anyhow::Result<ExperimentConfig> {
        let mut config = ExperimentConfig::load(self.config.as_deref())?;
        if let Some(limit) = self.limit {
            config.dataset.limit = Some(limit);
        }
        if !self.families.is_empty() {
            config.dataset.families = self.families.clone();
        }
        if let Some(n_mels) = self.n_mels {
            config.features.mel.n_mels = n_mels;
        }
        if let Some(jobs) = self.jobs {
            config.evaluation.jobs = jobs;
        }
        Ok(config)
    }
}

fn parse_family(s: &str) -> Result<InstrumentFamily, String> {
    s.parse().map_err(|_| {
        let known: Vec<_> = InstrumentFamily::ALL.iter().map(|f| f.name()).collect();
        format!("expected one of {}", known.join(", "))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init()
    }

    match Command::parse() {
        Command::Evaluate {
            train,
            test,
            test_fraction,
            seed,
            report_json,
            common,
        } => {
            let mut config = common.load_config()?;
            if let Some(test_fraction) = test_fraction {
                config.evaluation.test_fraction = test_fraction;
            }
            if let Some(seed) = seed {
                config.evaluation.seed = seed;
            }
            config.validate()?;
            evaluate(&train, test.as_deref(), report_json.as_deref(), config).await
        }
        Command::Features { path, out, common } => {
            let config = common.load_config()?;
            config.validate()?;
            export_features(&path, &out, config).await
        }
        Command::Inspect {
            path,
            note_str,
            png,
            common,
        } => {
            let config = common.load_config()?;
            config.validate()?;
            inspect(&path, &note_str, png.as_deref(), config)
        }
        Command::ShowConfig { common } => {
            let config = common.load_config()?;
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn extractor_for(config: &ExperimentConfig) -> anyhow::Result<FeatureExtractor> {
    let extractor = FeatureExtractor::new(config.dataset.sample_rate, config.features.clone())
        .context("invalid feature configuration")?;
    info!(len = extractor.layout().len(), "feature vector layout");
    Ok(extractor)
}

#[instrument(skip(config))]
async fn evaluate(
    train_root: &Path,
    test_root: Option<&Path>,
    report_json: Option<&Path>,
    config: ExperimentConfig,
) -> anyhow::Result<()> {
    let extractor = extractor_for(&config)?;
    let jobs = config.evaluation.jobs;

    let train_set = Dataset::open(train_root, config.dataset.clone())
        .with_context(|| format!("failed to open {}", train_root.display()))?;
    let (train_rows, test_rows) = match test_root {
        Some(test_root) => {
            let test_set = Dataset::open(test_root, config.dataset.clone())
                .with_context(|| format!("failed to open {}", test_root.display()))?;
            let train_rows = featurize(
                train_root.to_path_buf(),
                config.dataset.clone(),
                train_set.into_records(),
                extractor.clone(),
                jobs,
            )
            .await?;
            let test_rows = featurize(
                test_root.to_path_buf(),
                config.dataset.clone(),
                test_set.into_records(),
                extractor,
                jobs,
            )
            .await?;
            (train_rows, test_rows)
        }
        None => {
            let rows = featurize(
                train_root.to_path_buf(),
                config.dataset.clone(),
                train_set.into_records(),
                extractor,
                jobs,
            )
            .await?;
            train_test_split(
                rows,
                |row| row.family,
                config.evaluation.test_fraction,
                config.evaluation.seed,
            )?
        }
    };
    if train_rows.is_empty() || test_rows.is_empty() {
        bail!(
            "need notes on both sides, got {} train and {} test",
            train_rows.len(),
            test_rows.len()
        );
    }
    info!(train = train_rows.len(), test = test_rows.len(), "split notes");

    let (x_train, y_train) = to_matrix(&train_rows)?;
    let (x_test, y_test) = to_matrix(&test_rows)?;

    let start = std::time::Instant::now();
    let model = config.classifier.fit(x_train.view(), &y_train)?;
    let predictions = model.predict(x_test.view())?;
    let elapsed = start.elapsed();
    info!(?elapsed, classes = model.classes().len(), "fitted and predicted");

    let mut labels: Vec<usize> = model.classes().to_vec();
    labels.extend(y_test.iter().copied());
    labels.sort_unstable();
    labels.dedup();
    let names = labels
        .iter()
        .map(|&label| family_name(label))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let report = classify::ClassificationReport::new(&labels, &names, &y_test, &predictions)?;
    println!("{report}");
    println!("confusion matrix (rows: true, columns: predicted)");
    println!("{}", report.confusion);

    if let Some(path) = report_json {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &report)?;
        info!(path = %path.display(), "wrote json report");
    }
    Ok(())
}

fn family_name(label: usize) -> anyhow::Result<String> {
    let id = u8::try_from(label).context("label out of range")?;
    Ok(InstrumentFamily::try_from(id)?.name().to_string())
}

#[instrument(skip(config))]
async fn export_features(root: &Path, out: &Path, config: ExperimentConfig) -> anyhow::Result<()> {
    let extractor = extractor_for(&config)?;
    let layout = extractor.layout();
    let dataset = Dataset::open(root, config.dataset.clone())
        .with_context(|| format!("failed to open {}", root.display()))?;
    let rows: Vec<FeatureRow> = featurize(
        root.to_path_buf(),
        config.dataset.clone(),
        dataset.into_records(),
        extractor,
        config.evaluation.jobs,
    )
    .await?;

    let file = File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    for row in &rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    debug!(columns = ?layout.names(), "feature columns");
    info!(n_rows = rows.len(), len = layout.len(), out = %out.display(), "wrote features");
    Ok(())
}

#[instrument(skip(config))]
fn inspect(
    root: &Path,
    note_str: &str,
    png: Option<&Path>,
    config: ExperimentConfig,
) -> anyhow::Result<()> {
    // no family/limit filtering when looking up a single note
    let lookup = dataset::DatasetConfig {
        limit: None,
        families: Vec::new(),
        ..config.dataset.clone()
    };
    let dataset = Dataset::open(root, lookup)?;
    let Some(record) = dataset.find(note_str) else {
        bail!("no note {note_str:?} in {}", root.display());
    };
    let note = dataset.load_note(record)?;
    let extractor = extractor_for(&config)?;

    println!("{}", serde_json::to_string_pretty(record)?);
    println!(
        "{} samples at {} Hz ({:.2} s)",
        note.samples.len(),
        note.sample_rate,
        note.samples.len() as f32 / note.sample_rate as f32
    );

    let vector = extractor.extract(&record.metadata(), &note.samples)?;
    for (name, value) in extractor.layout().names().iter().zip(&vector) {
        println!("{name:>20} {value:>10.3}");
    }

    if let Some(png) = png {
        let mel = extractor.mel_spectrogram(&note.samples)?;
        render::spectrogram_to_png(&mel, png)?;
        info!(path = %png.display(), frames = mel.len(), "rendered mel spectrogram");
    }
    Ok(())
}
