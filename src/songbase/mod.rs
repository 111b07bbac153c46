pub mod extract;
pub mod json;

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};

use crate::config::Config;
use crate::error::{RefrainError, Result};

/// One recorded performance of a song: the representation matrix holds one
/// feature vector per time sample (num_features × num_samples).
#[derive(Debug, Clone)]
pub struct Cover {
    pub song_id: String,
    pub cover_id: String,
    pub representation: Array2<f32>,
}

/// Song database: song id → all covers loaded for it.
///
/// A `BTreeMap` keeps iteration order stable, so sampling with a seeded RNG
/// reproduces the same batches run to run.
pub type SongMap = BTreeMap<String, Vec<Cover>>;

/// Scale a representation matrix to zero mean and unit variance in place.
pub fn normalize(repr: &mut Array2<f32>) -> Result<()> {
    let mean = repr
        .mean()
        .ok_or_else(|| RefrainError::InvalidInput("empty representation matrix".to_string()))?;
    let std = repr.std(0.0);
    if std <= f32::EPSILON {
        return Err(RefrainError::InvalidInput(
            "representation matrix has zero variance".to_string(),
        ));
    }
    repr.mapv_inplace(|v| (v - mean) / std);
    Ok(())
}

/// Draw a sub-mapping of exactly `n` songs, uniformly without replacement.
///
/// Keys are unique and no particular ordering is guaranteed. Asking for more
/// songs than the universe holds is a configuration error, not a smaller
/// result.
pub fn sample_songs<'a, V>(
    songs: &'a BTreeMap<String, V>,
    n: usize,
    rng: &mut StdRng,
) -> Result<BTreeMap<&'a str, &'a V>> {
    if n == 0 {
        return Err(RefrainError::Configuration(
            "cannot sample zero songs".to_string(),
        ));
    }
    if n > songs.len() {
        return Err(RefrainError::Configuration(format!(
            "requested {n} songs but only {} are available",
            songs.len()
        )));
    }

    let keys: Vec<&String> = songs.keys().collect();
    Ok(keys
        .choose_multiple(rng, n)
        .map(|k| (k.as_str(), &songs[k.as_str()]))
        .collect())
}

/// Partition a song map into (train, validation) by song, keeping roughly
/// `train_fraction` of the songs in the first map. Covers of one song never
/// straddle the split.
pub fn split_songs(songs: SongMap, train_fraction: f32, rng: &mut StdRng) -> (SongMap, SongMap) {
    let mut keys: Vec<String> = songs.keys().cloned().collect();
    keys.shuffle(rng);

    let n_train = ((keys.len() as f32) * train_fraction).round() as usize;
    let train_keys: BTreeSet<String> = keys.into_iter().take(n_train).collect();

    let mut train = SongMap::new();
    let mut valid = SongMap::new();
    for (song_id, covers) in songs {
        if train_keys.contains(&song_id) {
            train.insert(song_id, covers);
        } else {
            valid.insert(song_id, covers);
        }
    }
    (train, valid)
}

/// Load the train and test song maps named by the configuration.
///
/// Each source directory is loaded independently, optionally capped to
/// `n_songs` random songs, and merged; a song id appearing in two sources
/// keeps the later source's covers.
pub fn from_config(config: &Config, rng: &mut StdRng) -> Result<(SongMap, SongMap)> {
    let train = load_sources(&config.songbase.train_datasets, rng)?;
    let test = load_sources(&config.songbase.test_datasets, rng)?;
    tracing::info!(
        "loaded songbase: {} training songs, {} test songs",
        train.len(),
        test.len()
    );
    Ok((train, test))
}

fn load_sources(sources: &[crate::config::SongbaseSource], rng: &mut StdRng) -> Result<SongMap> {
    let mut merged = SongMap::new();
    for source in sources {
        let dir = Config::expand_path(&source.path);
        let mut songs = json::load_songs_dir(&dir, source.normalized)?;
        if let Some(n) = source.n_songs
            && n < songs.len()
        {
            let keep: BTreeSet<String> = sample_songs(&songs, n, rng)?
                .keys()
                .map(|k| (*k).to_string())
                .collect();
            songs.retain(|k, _| keep.contains(k));
        }
        tracing::debug!("{}: {} songs", dir.display(), songs.len());
        merged.extend(songs);
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn song_map(n: usize) -> BTreeMap<String, u32> {
        (0..n).map(|i| (format!("song{i:03}"), i as u32)).collect()
    }

    #[test]
    fn sample_songs_exact_count_unique_keys() {
        let songs = song_map(20);
        let mut rng = StdRng::seed_from_u64(1);
        let picked = sample_songs(&songs, 5, &mut rng).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(picked.len(), 5);
        for key in picked.keys() {
            assert!(songs.contains_key(*key));
        }
    }

    #[test]
    fn sample_songs_too_many_is_configuration_error() {
        let songs = song_map(3);
        let mut rng = StdRng::seed_from_u64(1);
        let err = sample_songs(&songs, 4, &mut rng).unwrap_err();
        assert!(matches!(err, RefrainError::Configuration(_)));
    }

    #[test]
    fn sample_songs_zero_is_configuration_error() {
        let songs = song_map(3);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_songs(&songs, 0, &mut rng).is_err());
    }

    #[test]
    fn sample_songs_seed_reproducible() {
        let songs = song_map(50);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        let a = sample_songs(&songs, 10, &mut rng_a).unwrap_or_else(|e| panic!("{e}"));
        let b = sample_songs(&songs, 10, &mut rng_b).unwrap_or_else(|e| panic!("{e}"));
        let keys_a: Vec<_> = a.keys().collect();
        let keys_b: Vec<_> = b.keys().collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn split_songs_partitions_without_overlap() {
        let songs: SongMap = (0..10)
            .map(|i| (format!("s{i}"), Vec::new()))
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let (train, valid) = split_songs(songs, 0.8, &mut rng);
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len(), 2);
        for key in train.keys() {
            assert!(!valid.contains_key(key));
        }
    }

    #[test]
    fn normalize_zero_mean_unit_variance() {
        let mut repr = Array2::from_shape_fn((4, 100), |(f, t)| (f * 100 + t) as f32);
        normalize(&mut repr).unwrap_or_else(|e| panic!("{e}"));
        let mean = repr.mean().unwrap_or(f32::NAN);
        let std = repr.std(0.0);
        assert!(mean.abs() < 1e-4, "mean was {mean}");
        assert!((std - 1.0).abs() < 1e-4, "std was {std}");
    }

    #[test]
    fn normalize_constant_matrix_rejected() {
        let mut repr = Array2::from_elem((4, 10), 2.5f32);
        assert!(normalize(&mut repr).is_err());
    }
}
