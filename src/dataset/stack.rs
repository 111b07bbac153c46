use ndarray::{Array3, Array5, ArrayView2, ArrayView3, Axis};

use crate::error::{RefrainError, Result};
use crate::songbase::Cover;

use super::segment::segment_and_scale;

/// All covers of one song, aligned on a common segment axis.
///
/// Shape (num_segments, num_covers, 1, num_features, frame_size); the
/// singleton axis is the channel dimension the embedding model expects.
pub type SongFrameStack = Array5<f32>;

/// Build the aligned frame stack for one song.
///
/// Each cover is segmented independently, then every sequence is truncated
/// to one frame less than the shortest cover's length. The extra frame of
/// margin absorbs boundary drift from the rescale step and is intentional;
/// changing it changes which frames are eligible for sampling.
pub fn build_song_stack(
    song_id: &str,
    covers: &[Cover],
    frame_size: usize,
    scale: (f32, f32),
) -> Result<SongFrameStack> {
    if covers.is_empty() {
        return Err(RefrainError::InvalidInput(format!(
            "song {song_id} has no covers"
        )));
    }

    let num_features = covers[0].representation.nrows();
    for cover in covers {
        if cover.representation.nrows() != num_features {
            return Err(RefrainError::InvalidInput(format!(
                "song {song_id}, cover {}: feature count {} does not match the \
                 song's first cover ({num_features})",
                cover.cover_id,
                cover.representation.nrows()
            )));
        }
    }

    let mut sequences = Vec::with_capacity(covers.len());
    for cover in covers {
        let frames = segment_and_scale(cover.representation.view(), frame_size, scale)
            .map_err(|e| match e {
                RefrainError::InvalidInput(msg) => RefrainError::InvalidInput(format!(
                    "song {song_id}, cover {}: {msg}",
                    cover.cover_id
                )),
                other => other,
            })?;
        sequences.push(frames);
    }

    let min_len = sequences.iter().map(Vec::len).min().unwrap_or(0);
    if min_len <= 1 {
        return Err(RefrainError::InvalidInput(format!(
            "song {song_id}: covers align to only {min_len} frame(s); too short \
             to sample after the safety crop"
        )));
    }
    let num_segments = min_len - 1;

    let mut cover_stacks: Vec<Array3<f32>> = Vec::with_capacity(sequences.len());
    for frames in &sequences {
        let views: Vec<ArrayView2<'_, f32>> =
            frames[..num_segments].iter().map(ndarray::Array2::view).collect();
        let stacked = ndarray::stack(Axis(0), &views)
            .map_err(|e| RefrainError::Other(format!("song {song_id}: {e}")))?;
        cover_stacks.push(stacked);
    }

    let views: Vec<ArrayView3<'_, f32>> =
        cover_stacks.iter().map(Array3::view).collect();
    let stacked = ndarray::stack(Axis(1), &views)
        .map_err(|e| RefrainError::Other(format!("song {song_id}: {e}")))?;

    Ok(stacked.insert_axis(Axis(2)))
}
