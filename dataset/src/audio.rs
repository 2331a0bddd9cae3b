//! Waveform decoding via symphonia, down-mixed to mono and resampled with rubato.

use std::path::Path;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::{
    audio::AudioBuffer,
    codecs::DecoderOptions,
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, instrument, trace, warn};

use crate::{Error, Result};

const RESAMPLE_CHUNK: usize = 1024;

#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Mono samples at `sample_rate`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Rate of the file before resampling.
    pub original_rate: u32,
    pub channels: usize,
}

#[instrument(level = "trace")]
pub fn decode(path: &Path, target_rate: u32) -> Result<DecodedAudio> {
    let decode_err = |source: SymphoniaError| Error::Decode {
        path: path.to_path_buf(),
        source,
    };

    let file = std::fs::File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stream = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(decode_err)?;

    let tracks = probed.format.tracks();
    if tracks.len() != 1 {
        warn!(n_tracks = tracks.len(), "file has multiple tracks, using only default");
    }
    let track = probed.format.default_track().ok_or_else(|| Error::NoTrack {
        path: path.to_path_buf(),
    })?;
    let original_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::UnknownSampleRate {
            path: path.to_path_buf(),
        })?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(decode_err)?;
    trace!(params = ?track.codec_params, "read codec params");
    let track_id = track.id;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match probed.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(err) => return Err(decode_err(err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).map_err(decode_err)?;
        let mut converted: AudioBuffer<f32> =
            AudioBuffer::new(decoded.capacity() as u64, decoded.spec().to_owned());
        decoded.convert(&mut converted);
        let planes = converted.planes();
        let planes_slice = planes.planes();
        if channels.len() != planes_slice.len() {
            trace!("resizing channels due to size mismatch");
            channels.resize_with(planes_slice.len(), Vec::new);
        }
        channels
            .iter_mut()
            .zip(planes_slice)
            .for_each(|(d, v)| d.extend_from_slice(v));
    }

    let n_channels = channels.len();
    let mono = downmix(channels);
    if mono.is_empty() {
        return Err(Error::EmptyAudio {
            path: path.to_path_buf(),
        });
    }

    let samples = resample(mono, original_rate, target_rate)?;
    debug!(
        n_samples = samples.len(),
        original_rate,
        target_rate,
        n_channels,
        "decoded audio"
    );

    Ok(DecodedAudio {
        samples,
        sample_rate: target_rate,
        original_rate,
        channels: n_channels,
    })
}

/// Averages all channels into one.
pub fn downmix(mut channels: Vec<Vec<f32>>) -> Vec<f32> {
    match channels.len() {
        0 => Vec::new(),
        1 => channels.swap_remove(0),
        n => {
            let len = channels.iter().map(Vec::len).min().unwrap_or(0);
            (0..len)
                .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Resamples a mono signal; output length is `round(len * to / from)`.
pub fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples);
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|source| Error::ResamplerSetup { from, to, source })?;
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let delay = resampler.output_delay();

    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut chunks = samples.chunks_exact(resampler.input_frames_next());
    for chunk in chunks.by_ref() {
        out.extend(resampler.process(&[chunk][..], None)?.swap_remove(0));
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        out.extend(resampler.process_partial(Some(&[rest][..]), None)?.swap_remove(0));
    }
    while out.len() < expected + delay {
        out.extend(resampler.process_partial::<&[f32]>(None, None)?.swap_remove(0));
    }

    out.drain(..delay);
    out.truncate(expected);
    Ok(out)
}
