pub mod loss;
pub mod metrics;

pub use loss::batch_hard_triplet_loss;
pub use metrics::{
    ClassifierReport, RocPoint, ThresholdClassifier, auc, mean_average_precision,
    mean_reciprocal_rank, pick_threshold, roc_curve,
};

use ndarray::{Array4, ArrayView4, Axis};

use crate::dataset::segment_and_scale;
use crate::error::{RefrainError, Result};
use crate::model::EmbeddingModel;
use crate::songbase::SongMap;

/// One cover projected into the learned space.
#[derive(Debug, Clone)]
pub struct CoverEmbedding {
    pub song_id: String,
    pub cover_id: String,
    pub embedding: Vec<f32>,
}

/// Embed every cover of an evaluation song map.
///
/// Each cover is segmented like the training data, all of its frames are run
/// through the model as one batch, and the frame embeddings are averaged
/// into a single vector per cover.
pub fn embed_covers(
    model: &mut dyn EmbeddingModel,
    songs: &SongMap,
    frame_size: usize,
    scale: (f32, f32),
) -> Result<Vec<CoverEmbedding>> {
    let mut embeddings = Vec::new();
    for (song_id, covers) in songs {
        for cover in covers {
            let frames = segment_and_scale(cover.representation.view(), frame_size, scale)
                .map_err(|e| match e {
                    RefrainError::InvalidInput(msg) => RefrainError::InvalidInput(format!(
                        "song {song_id}, cover {}: {msg}",
                        cover.cover_id
                    )),
                    other => other,
                })?;

            let batch = frames_to_batch(&frames)?;
            let frame_embeddings = model.embed(&batch)?;
            let mean = frame_embeddings.mean_axis(Axis(0)).ok_or_else(|| {
                RefrainError::Eval(format!(
                    "song {song_id}, cover {}: no frame embeddings",
                    cover.cover_id
                ))
            })?;

            embeddings.push(CoverEmbedding {
                song_id: song_id.clone(),
                cover_id: cover.cover_id.clone(),
                embedding: mean.to_vec(),
            });
        }
    }

    if embeddings.is_empty() {
        return Err(RefrainError::Eval(
            "evaluation set contains no covers".to_string(),
        ));
    }

    tracing::info!("embedded {} covers with {}", embeddings.len(), model.name());
    Ok(embeddings)
}

fn frames_to_batch(frames: &[ndarray::Array2<f32>]) -> Result<Array4<f32>> {
    let views: Vec<ArrayView4<'_, f32>> = frames
        .iter()
        .map(|f| f.view().insert_axis(Axis(0)).insert_axis(Axis(0)))
        .collect();
    ndarray::concatenate(Axis(0), &views)
        .map_err(|e| RefrainError::Eval(format!("failed to batch frames: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::songbase::Cover;
    use ndarray::Array2;

    /// Embeds each frame as (frame mean, 1.0) so tests can predict outputs.
    struct MeanModel;

    impl EmbeddingModel for MeanModel {
        fn embed(&mut self, batch: &Array4<f32>) -> Result<Array2<f32>> {
            let rows = batch.shape()[0];
            let mut out = Array2::zeros((rows, 2));
            for (i, frame) in batch.axis_iter(Axis(0)).enumerate() {
                out[[i, 0]] = frame.mean().unwrap_or(0.0);
                out[[i, 1]] = 1.0;
            }
            Ok(out)
        }
    }

    fn song(song_id: &str, n_covers: usize, level: f32) -> (String, Vec<Cover>) {
        let covers = (0..n_covers)
            .map(|c| Cover {
                song_id: song_id.to_string(),
                cover_id: format!("c{c}"),
                representation: Array2::from_elem((4, 300), level + c as f32 * 0.01),
            })
            .collect();
        (song_id.to_string(), covers)
    }

    #[test]
    fn one_embedding_per_cover() {
        let songs: SongMap = [song("a", 2, 1.0), song("b", 3, -1.0)].into_iter().collect();
        let mut model = MeanModel;
        let embeddings = embed_covers(&mut model, &songs, 50, (1.0, 0.5))
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(embeddings.len(), 5);
        assert_eq!(embeddings[0].embedding.len(), 2);
    }

    #[test]
    fn averaging_preserves_constant_level() {
        let songs: SongMap = [song("a", 2, 2.0)].into_iter().collect();
        let mut model = MeanModel;
        let embeddings = embed_covers(&mut model, &songs, 50, (1.0, 0.5))
            .unwrap_or_else(|e| panic!("{e}"));
        assert!((embeddings[0].embedding[0] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn empty_song_map_is_eval_error() {
        let songs = SongMap::new();
        let mut model = MeanModel;
        let err = embed_covers(&mut model, &songs, 50, (1.0, 0.5)).unwrap_err();
        assert!(matches!(err, RefrainError::Eval(_)));
    }

    #[test]
    fn short_cover_error_names_the_cover() {
        let songs: SongMap = [(
            "a".to_string(),
            vec![Cover {
                song_id: "a".to_string(),
                cover_id: "shorty".to_string(),
                representation: Array2::zeros((4, 10)),
            }],
        )]
        .into_iter()
        .collect();
        let mut model = MeanModel;
        let err = embed_covers(&mut model, &songs, 50, (1.0, 0.5))
            .unwrap_err()
            .to_string();
        assert!(err.contains("shorty"));
    }
}
