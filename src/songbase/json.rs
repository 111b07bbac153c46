use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::error::{RefrainError, Result};

use super::{Cover, SongMap, normalize};

/// Load a songbase directory.
///
/// Layout mirrors the covers1000 feature dumps: one subdirectory per song
/// id, one JSON matrix file (features × time, row per feature) per cover.
/// The cover id is the file stem up to the first `_`. Unless
/// `already_normalized` is set, every matrix is rescaled to zero mean and
/// unit variance on load.
pub fn load_songs_dir(dir: &Path, already_normalized: bool) -> Result<SongMap> {
    if !dir.is_dir() {
        return Err(RefrainError::Songbase(format!(
            "songbase directory not found: {}",
            dir.display()
        )));
    }

    let mut songs = SongMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let song_dir = entry.path();
        if !song_dir.is_dir() {
            continue;
        }
        let song_id = entry.file_name().to_string_lossy().to_string();

        let mut covers = Vec::new();
        for cover_entry in fs::read_dir(&song_dir)? {
            let cover_path = cover_entry?.path();
            if cover_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let stem = cover_path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let cover_id = stem.split('_').next().unwrap_or(&stem).to_string();

            let mut representation = read_matrix(&cover_path)?;
            if !already_normalized {
                normalize(&mut representation).map_err(|e| {
                    RefrainError::Songbase(format!("{}: {e}", cover_path.display()))
                })?;
            }

            covers.push(Cover {
                song_id: song_id.clone(),
                cover_id,
                representation,
            });
        }

        if covers.is_empty() {
            tracing::warn!("song {song_id} has no cover files, skipping");
            continue;
        }
        if covers.len() < 2 {
            tracing::warn!("song {song_id} has a single cover and cannot form positive pairs");
        }

        // Stable cover order regardless of directory enumeration.
        covers.sort_by(|a, b| a.cover_id.cmp(&b.cover_id));
        songs.insert(song_id, covers);
    }

    Ok(songs)
}

fn read_matrix(path: &Path) -> Result<Array2<f32>> {
    let contents = fs::read_to_string(path)?;
    let rows: Vec<Vec<f32>> = serde_json::from_str(&contents).map_err(|e| {
        RefrainError::Songbase(format!("{}: not a numeric matrix: {e}", path.display()))
    })?;

    let num_features = rows.len();
    let num_samples = rows.first().map_or(0, Vec::len);
    if num_features == 0 || num_samples == 0 {
        return Err(RefrainError::Songbase(format!(
            "{}: empty representation matrix",
            path.display()
        )));
    }
    if rows.iter().any(|r| r.len() != num_samples) {
        return Err(RefrainError::Songbase(format!(
            "{}: ragged representation matrix",
            path.display()
        )));
    }

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((num_features, num_samples), flat)
        .map_err(|e| RefrainError::Songbase(format!("{}: {e}", path.display())))
}

/// Write one representation matrix as a JSON row-per-feature array, creating
/// the parent directory as needed.
pub fn write_matrix(path: &Path, representation: &Array2<f32>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rows: Vec<Vec<f32>> = representation
        .rows()
        .into_iter()
        .map(|r| r.to_vec())
        .collect();
    let file = fs::File::create(path)?;
    serde_json::to_writer(file, &rows)?;
    Ok(())
}
