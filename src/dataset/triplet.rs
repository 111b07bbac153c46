use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::config::DatasetConfig;
use crate::error::{RefrainError, Result};
use crate::songbase::SongMap;

use super::Batch;
use super::sampler::{SongUniverse, sample_batch};
use super::stack::build_song_stack;

/// Precomputed hard-triplet batch collection.
///
/// All batches are materialized at construction and replayed by index during
/// training: `get(i)` returns the identical tensors every time for the life
/// of the set. Construction either completes for every song and batch or
/// fails as a whole; no partial set is ever observable.
#[derive(Debug)]
pub struct HardTripletBatchSet {
    batches: Vec<Batch>,
}

impl HardTripletBatchSet {
    /// Build the batch set with an explicit RNG.
    ///
    /// Per-song frame stacks carry no cross-song state, so they are built in
    /// parallel and merged only once every song has finished; sampling then
    /// runs serially against the completed universe.
    pub fn from_songs(
        songs: &SongMap,
        config: &DatasetConfig,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if config.n_batches == 0 {
            return Err(RefrainError::Configuration(
                "n_batches must be at least 1".to_string(),
            ));
        }

        let universe: SongUniverse = songs
            .par_iter()
            .map(|(song_id, covers)| {
                build_song_stack(song_id, covers, config.frame_size, config.scale)
                    .map(|stack| (song_id.clone(), stack))
            })
            .collect::<Result<_>>()?;

        if config.songs_per_batch > universe.len() {
            return Err(RefrainError::Configuration(format!(
                "songs_per_batch ({}) exceeds the {} eligible songs",
                config.songs_per_batch,
                universe.len()
            )));
        }

        let mut batches = Vec::with_capacity(config.n_batches);
        let mut total_samples = 0usize;
        for _ in 0..config.n_batches {
            let batch = sample_batch(&universe, config.songs_per_batch, rng)?;
            total_samples += batch.num_samples();
            batches.push(batch);
        }

        tracing::info!(
            "built {} batches, {total_samples} total samples",
            batches.len()
        );

        Ok(Self { batches })
    }

    /// Build the batch set, seeding the RNG from the configuration (or the
    /// OS when no seed is configured).
    pub fn from_config(songs: &SongMap, config: &DatasetConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::from_songs(songs, config, &mut rng)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Batch> {
        self.batches.get(index).ok_or(RefrainError::IndexOutOfRange {
            index,
            len: self.batches.len(),
        })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Batch> {
        self.batches.iter()
    }
}

impl<'a> IntoIterator for &'a HardTripletBatchSet {
    type Item = &'a Batch;
    type IntoIter = std::slice::Iter<'a, Batch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.iter()
    }
}
