use std::fs;
use std::path::Path;

use audioadapter_buffers::direct::SequentialSliceOfVecs;
use mel_spec::fbank::{Fbank, FbankConfig};
use ndarray::Array2;
use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler as RubatoResampler};

use crate::error::{RefrainError, Result};

use super::json::write_matrix;

const TARGET_SAMPLE_RATE: u32 = 16000;

/// Extract log-Mel representation matrices for a directory of WAV covers.
///
/// Expects the songbase layout (`<song_id>/<cover>.wav`) and writes the
/// matching `<song_id>/<cover>.json` tree under `output`. Matrices are
/// written unnormalized; the loader rescales them.
///
/// Returns the number of covers written.
pub fn extract_dir(input: &Path, output: &Path) -> Result<usize> {
    if !input.is_dir() {
        return Err(RefrainError::Extract(format!(
            "input directory not found: {}",
            input.display()
        )));
    }

    let mut written = 0usize;
    for entry in fs::read_dir(input)? {
        let entry = entry?;
        let song_dir = entry.path();
        if !song_dir.is_dir() {
            continue;
        }
        let song_id = entry.file_name().to_string_lossy().to_string();

        for cover_entry in fs::read_dir(&song_dir)? {
            let cover_path = cover_entry?.path();
            if cover_path.extension().and_then(|e| e.to_str()) != Some("wav") {
                continue;
            }

            let representation = extract_file(&cover_path)?;
            let stem = cover_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let out_path = output.join(&song_id).join(format!("{stem}.json"));
            write_matrix(&out_path, &representation)?;
            written += 1;
            tracing::debug!(
                "{}: {} features × {} frames",
                out_path.display(),
                representation.nrows(),
                representation.ncols()
            );
        }
    }

    tracing::info!("extracted {written} cover representations to {}", output.display());
    Ok(written)
}

/// Compute the log-Mel filterbank representation of one WAV file,
/// returned as features × time.
pub fn extract_file(path: &Path) -> Result<Array2<f32>> {
    let (samples, sample_rate, channels) = read_wav(path)?;
    let mono = mix_to_mono(&samples, channels);
    let mono = resample_to_target(&mono, sample_rate)?;

    if mono.is_empty() {
        return Err(RefrainError::Extract(format!(
            "{}: no audio samples",
            path.display()
        )));
    }

    let fbank = Fbank::new(FbankConfig::default());
    let features = fbank.compute(&mono);
    let num_frames = features.nrows();
    let num_bins = features.ncols();
    if num_frames == 0 {
        return Err(RefrainError::Extract(format!(
            "{}: audio too short for even one feature frame",
            path.display()
        )));
    }
    let flat: Vec<f32> = features.into_raw_vec_and_offset().0;

    // Fbank yields frames × bins; representation matrices are features × time.
    let frames_by_bins = Array2::from_shape_vec((num_frames, num_bins), flat)
        .map_err(|e| RefrainError::Extract(format!("{}: {e}", path.display())))?;
    Ok(frames_by_bins.reversed_axes().as_standard_layout().to_owned())
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32, u16)> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| RefrainError::Extract(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| RefrainError::Extract(format!("{}: {e}", path.display())))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| RefrainError::Extract(format!("{}: {e}", path.display())))?
        }
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let ch = channels as usize;
    let frame_count = interleaved.len() / ch;
    let mut mono = Vec::with_capacity(frame_count);
    for i in 0..frame_count {
        let mut sum = 0.0f32;
        for c in 0..ch {
            sum += interleaved[i * ch + c];
        }
        mono.push(sum / ch as f32);
    }
    mono
}

/// Resample mono audio to 16kHz in one pass.
fn resample_to_target(mono: &[f32], source_rate: u32) -> Result<Vec<f32>> {
    if source_rate == TARGET_SAMPLE_RATE {
        return Ok(mono.to_vec());
    }

    let chunk_size = 1024;
    let mut resampler = Fft::new(
        source_rate as usize,
        TARGET_SAMPLE_RATE as usize,
        chunk_size,
        2, // sub_chunks
        1, // mono
        FixedSync::Input,
    )
    .map_err(|e| RefrainError::Extract(format!("failed to create resampler: {e}")))?;

    let frames_needed = resampler.input_frames_next();
    let mut input_buf = mono.to_vec();
    // Zero-pad the tail so the final partial chunk is not dropped.
    let remainder = input_buf.len() % frames_needed;
    if remainder != 0 {
        input_buf.resize(input_buf.len() + frames_needed - remainder, 0.0);
    }

    let mut output = Vec::new();
    while input_buf.len() >= frames_needed {
        let chunk: Vec<f32> = input_buf.drain(..frames_needed).collect();
        let input_data = vec![chunk];
        let wrapped = SequentialSliceOfVecs::new(&input_data, 1, frames_needed)
            .map_err(|e| RefrainError::Extract(format!("buffer error: {e}")))?;
        let result = resampler
            .process(&wrapped, 0, None)
            .map_err(|e| RefrainError::Extract(format!("resample error: {e}")))?;
        let out_frames = result.frames();
        for frame in 0..out_frames {
            output.push(result.read_sample(0, frame).unwrap_or(0.0));
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::songbase::json::load_songs_dir;

    fn write_wav(path: &Path, seconds: f32, freq: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        fs::create_dir_all(path.parent().unwrap_or(Path::new(".")))
            .unwrap_or_else(|e| panic!("{e}"));
        let mut writer = hound::WavWriter::create(path, spec).unwrap_or_else(|e| panic!("{e}"));
        let n = (seconds * TARGET_SAMPLE_RATE as f32) as usize;
        for i in 0..n {
            let t = i as f32 / TARGET_SAMPLE_RATE as f32;
            let v = (t * freq * 2.0 * std::f32::consts::PI).sin();
            writer
                .write_sample((v * 0.5 * f32::from(i16::MAX)) as i16)
                .unwrap_or_else(|e| panic!("{e}"));
        }
        writer.finalize().unwrap_or_else(|e| panic!("{e}"));
    }

    #[test]
    fn mix_to_mono_averages_channels() {
        let interleaved = [1.0, 3.0, 5.0, 7.0];
        let mono = mix_to_mono(&interleaved, 2);
        assert_eq!(mono, vec![2.0, 6.0]);
    }

    #[test]
    fn passthrough_at_target_rate() {
        let input: Vec<f32> = (0..1600).map(|i| (i as f32 / 1600.0).sin()).collect();
        let output = resample_to_target(&input, TARGET_SAMPLE_RATE)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(output.len(), input.len());
    }

    #[test]
    fn extract_dir_round_trips_through_loader() {
        let input = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let output = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        write_wav(&input.path().join("100/7001_studio.wav"), 2.0, 440.0);
        write_wav(&input.path().join("100/7002_live.wav"), 2.0, 220.0);

        let written =
            extract_dir(input.path(), output.path()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(written, 2);

        let songs = load_songs_dir(output.path(), false).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(songs["100"].len(), 2);
        let repr = &songs["100"][0].representation;
        assert!(repr.nrows() > 0);
        assert!(repr.ncols() > 1);
    }

    #[test]
    fn missing_input_dir_is_error() {
        let output = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        assert!(extract_dir(Path::new("/nonexistent/wavs"), output.path()).is_err());
    }
}
