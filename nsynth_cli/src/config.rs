use std::path::Path;

use anyhow::{ensure, Context};
use classify::GaussianNb;
use dataset::DatasetConfig;
use process::FeatureConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub evaluation: EvaluationConfig,
    pub dataset: DatasetConfig,
    pub features: FeatureConfig,
    pub classifier: GaussianNb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Held-out share when no separate test split is given.
    pub test_fraction: f64,
    pub seed: u64,
    /// Notes featurized concurrently.
    pub jobs: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
        }
    }
}

impl ExperimentConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let eval = &self.evaluation;
        ensure!(
            eval.test_fraction > 0.0 && eval.test_fraction < 1.0,
            "evaluation.test_fraction must be within (0, 1), got {}",
            eval.test_fraction
        );
        ensure!(eval.jobs > 0, "evaluation.jobs must be at least 1");
        ensure!(self.dataset.sample_rate > 0, "dataset.sample_rate must be positive");
        ensure!(
            self.dataset.clip_samples != Some(0),
            "dataset.clip_samples must be positive when set"
        );
        ensure!(
            self.classifier.var_smoothing >= 0.0,
            "classifier.var_smoothing must be non-negative"
        );
        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.toml");
        std::fs::write(
            &path,
            r#"
[evaluation]
seed = 7

[features.mel]
n_mels = 64
scale = "htk"

[dataset]
families = [0, 3]
"#,
        )
        .unwrap();

        let config = ExperimentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.evaluation.seed, 7);
        assert_eq!(config.evaluation.test_fraction, 0.2);
        assert_eq!(config.features.mel.n_mels, 64);
        assert_eq!(config.features.mel.scale, process::MelScale::Htk);
        assert_eq!(config.features.spectrogram.fft_len, 2048);
        assert_eq!(
            config.dataset.families,
            vec![dataset::InstrumentFamily::Bass, dataset::InstrumentFamily::Guitar]
        );
        config.validate().unwrap();
    }

    #[test]
    fn defaults_survive_toml_round_trip() {
        let config = ExperimentConfig::default();
        let text = config.to_toml().unwrap();
        let back: ExperimentConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ExperimentConfig::default();
        config.evaluation.test_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = ExperimentConfig::default();
        config.evaluation.jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(ExperimentConfig::load(Some(Path::new("/nonexistent/x.toml"))).is_err());
    }
}
