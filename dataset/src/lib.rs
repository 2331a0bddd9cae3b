use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

pub mod audio;
mod error;
pub mod models;
pub mod split;

pub use error::{Error, Result};
pub use models::{InstrumentFamily, InstrumentSource, Note, NoteRecord};

pub const INDEX_FILE: &str = "examples.json";
pub const AUDIO_DIR: &str = "audio";

/// NSynth notes are 4 s at 16 kHz.
pub const NSYNTH_SAMPLE_RATE: u32 = 16_000;
pub const NSYNTH_CLIP_SAMPLES: usize = 64_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Waveforms are resampled to this rate.
    pub sample_rate: u32,
    /// Zero-pad or truncate every waveform to this many samples.
    pub clip_samples: Option<usize>,
    /// Keep at most this many notes per split.
    pub limit: Option<usize>,
    /// Only keep these families; empty keeps all. Written as names, read as
    /// names or NSynth ids.
    #[serde(serialize_with = "family_names")]
    pub families: Vec<InstrumentFamily>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sample_rate: NSYNTH_SAMPLE_RATE,
            clip_samples: Some(NSYNTH_CLIP_SAMPLES),
            limit: None,
            families: Vec::new(),
        }
    }
}

fn family_names<S: serde::Serializer>(
    families: &[InstrumentFamily],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(families.iter().map(|family| family.name()))
}

/// One NSynth split directory: `examples.json` plus `audio/<note_str>.wav`.
#[derive(Debug, Clone)]
pub struct Dataset {
    root: PathBuf,
    config: DatasetConfig,
    records: Vec<NoteRecord>,
}

impl Dataset {
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>, config: DatasetConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let all = load_index(&root)?;
        let total = all.len();
        let records = filter(all, &config.families, config.limit);
        info!(total, kept = records.len(), "opened dataset");

        Ok(Self {
            root,
            config,
            records,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn records(&self) -> &[NoteRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<NoteRecord> {
        self.records
    }

    pub fn find(&self, note_str: &str) -> Option<&NoteRecord> {
        self.records.iter().find(|r| r.note_str == note_str)
    }

    pub fn audio_path(&self, record: &NoteRecord) -> PathBuf {
        audio_path(&self.root, record)
    }

    pub fn load_note(&self, record: &NoteRecord) -> Result<Note> {
        load_note(&self.root, &self.config, record)
    }
}

pub fn audio_path(root: &Path, record: &NoteRecord) -> PathBuf {
    root.join(AUDIO_DIR).join(format!("{}.wav", record.note_str))
}

/// Decodes a record's waveform and fits it to the configured length.
#[instrument(skip_all, fields(note = %record.note_str), level = "debug")]
pub fn load_note(root: &Path, config: &DatasetConfig, record: &NoteRecord) -> Result<Note> {
    let path = audio_path(root, record);
    let decoded = audio::decode(&path, config.sample_rate)?;
    if decoded.original_rate != record.sample_rate {
        warn!(
            declared = record.sample_rate,
            actual = decoded.original_rate,
            "sample rate differs from index"
        );
    }

    let mut samples = decoded.samples;
    if let Some(clip) = config.clip_samples {
        if samples.len() != clip {
            debug!(from = samples.len(), to = clip, "fitting clip length");
        }
        samples.resize(clip, 0.0);
    }

    Ok(Note {
        record: record.clone(),
        samples,
        sample_rate: decoded.sample_rate,
    })
}

/// Reads `examples.json`; records come back ordered by `note_str`.
pub fn load_index(root: &Path) -> Result<Vec<NoteRecord>> {
    let path = root.join(INDEX_FILE);
    let raw = std::fs::read_to_string(&path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;
    let index: BTreeMap<String, NoteRecord> =
        serde_json::from_str(&raw).map_err(|source| Error::Index { path, source })?;
    Ok(index.into_values().collect())
}

pub fn filter(
    records: Vec<NoteRecord>,
    families: &[InstrumentFamily],
    limit: Option<usize>,
) -> Vec<NoteRecord> {
    records
        .into_iter()
        .filter(|r| families.is_empty() || families.contains(&r.instrument_family))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use serde_json::json;

    pub fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            for _ in 0..channels {
                writer
                    .write_sample((sample * i16::MAX as f32) as i16)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    pub fn record_json(note_str: &str, family: u8, pitch: u8) -> serde_json::Value {
        json!({
            "note": pitch as u32 * 1000 + family as u32,
            "note_str": note_str,
            "instrument": family as u32 * 10,
            "instrument_str": format!("{note_str}_instrument"),
            "instrument_family": family,
            "instrument_family_str": "",
            "instrument_source": 1,
            "instrument_source_str": "electronic",
            "pitch": pitch,
            "velocity": 100,
            "sample_rate": 16000,
            "qualities": [0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            "qualities_str": []
        })
    }

    /// Writes an NSynth-style split with the given `(note_str, family, pitch)` notes.
    pub fn write_split(root: &Path, notes: &[(&str, u8, u8)], len: usize) {
        std::fs::create_dir_all(root.join(super::AUDIO_DIR)).unwrap();
        let mut index = serde_json::Map::new();
        for &(note_str, family, pitch) in notes {
            index.insert(note_str.to_string(), record_json(note_str, family, pitch));
            let freq = 440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0);
            write_wav(
                &root.join(super::AUDIO_DIR).join(format!("{note_str}.wav")),
                &sine(freq, 16_000, len),
                16_000,
                1,
            );
        }
        std::fs::write(
            root.join(super::INDEX_FILE),
            serde_json::to_string(&index).unwrap(),
        )
        .unwrap();
    }
}
