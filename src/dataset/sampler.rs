use std::collections::BTreeMap;

use ndarray::{ArrayView4, Axis};
use rand::Rng;
use rand::rngs::StdRng;

use crate::error::{RefrainError, Result};
use crate::songbase::sample_songs;

use super::Batch;
use super::stack::SongFrameStack;

/// Sampling universe: every song eligible for batch construction.
pub type SongUniverse = BTreeMap<String, SongFrameStack>;

/// Assemble one P×K batch.
///
/// Draws `songs_per_batch` distinct songs, picks one segment position per
/// song uniformly at random, and concatenates the chosen slices along the
/// sample axis. Labels repeat each song id once per contributed cover row,
/// so rows of one song are contiguous.
///
/// Any failure (an empty universe, P exceeding the eligible songs) is fatal:
/// a smaller-than-requested batch would break the fixed-P contract the loss
/// downstream relies on.
pub fn sample_batch(
    universe: &SongUniverse,
    songs_per_batch: usize,
    rng: &mut StdRng,
) -> Result<Batch> {
    let picked = sample_songs(universe, songs_per_batch, rng)?;

    let mut slices: Vec<ArrayView4<'_, f32>> = Vec::with_capacity(songs_per_batch);
    let mut labels = Vec::new();
    for (song_id, stack) in &picked {
        let num_segments = stack.shape()[0];
        let num_covers = stack.shape()[1];
        // Cover-count floor is a curation contract, not re-validated per draw.
        debug_assert!(
            num_covers >= 2,
            "song {song_id} entered the universe with fewer than 2 covers"
        );

        let segment = rng.random_range(0..num_segments);
        slices.push(stack.index_axis(Axis(0), segment));
        labels.extend(std::iter::repeat_n((*song_id).to_string(), num_covers));
    }

    let samples = ndarray::concatenate(Axis(0), &slices)
        .map_err(|e| RefrainError::Other(format!("batch concatenation failed: {e}")))?;

    debug_assert_eq!(samples.shape()[0], labels.len());
    Ok(Batch { samples, labels })
}
