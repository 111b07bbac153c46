pub mod sampler;
pub mod segment;
pub mod stack;
pub mod triplet;

pub use sampler::sample_batch;
pub use segment::segment_and_scale;
pub use stack::{SongFrameStack, build_song_stack};
pub use triplet::HardTripletBatchSet;

use ndarray::Array4;

/// One training batch: P songs, each contributing all of its covers at one
/// randomly chosen segment position.
///
/// `labels[i]` is the song id that produced row `i` of `samples`; rows of
/// one song are contiguous.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Shape (rows, 1, num_features, frame_size).
    pub samples: Array4<f32>,
    pub labels: Vec<String>,
}

impl Batch {
    /// Number of sample rows (equals `labels.len()`).
    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.samples.shape()[0]
    }

    /// Number of distinct songs in the batch.
    #[must_use]
    pub fn num_songs(&self) -> usize {
        let mut distinct = 0;
        let mut prev: Option<&str> = None;
        for label in &self.labels {
            if prev != Some(label.as_str()) {
                distinct += 1;
                prev = Some(label.as_str());
            }
        }
        distinct
    }
}
