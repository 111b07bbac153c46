use ndarray::Array2;

use crate::error::{RefrainError, Result};

/// Batch-hard triplet loss value.
///
/// For every anchor row the hardest positive is the farthest same-label row
/// and the hardest negative the nearest different-label row (euclidean
/// distance in embedding space); the loss is the mean hinge
/// `max(0, d_pos - d_neg + margin)` over anchors. This is the objective the
/// P×K batch layout exists to serve: every row has at least one positive and
/// one negative inside the batch.
pub fn batch_hard_triplet_loss(
    embeddings: &Array2<f32>,
    labels: &[String],
    margin: f32,
) -> Result<f32> {
    let n = embeddings.nrows();
    if n == 0 {
        return Err(RefrainError::Eval("empty embedding batch".to_string()));
    }
    if n != labels.len() {
        return Err(RefrainError::Eval(format!(
            "{n} embedding rows but {} labels",
            labels.len()
        )));
    }

    let mut total = 0.0f32;
    for anchor in 0..n {
        let mut hardest_pos: Option<f32> = None;
        let mut hardest_neg: Option<f32> = None;

        for other in 0..n {
            if other == anchor {
                continue;
            }
            let dist = euclidean(embeddings, anchor, other);
            if labels[other] == labels[anchor] {
                hardest_pos = Some(hardest_pos.map_or(dist, |d| d.max(dist)));
            } else {
                hardest_neg = Some(hardest_neg.map_or(dist, |d| d.min(dist)));
            }
        }

        let (Some(d_pos), Some(d_neg)) = (hardest_pos, hardest_neg) else {
            return Err(RefrainError::Eval(format!(
                "anchor for song {} lacks a positive or negative row; batches \
                 need at least 2 covers per song and 2 songs",
                labels[anchor]
            )));
        };

        total += (d_pos - d_neg + margin).max(0.0);
    }

    Ok(total / n as f32)
}

fn euclidean(embeddings: &Array2<f32>, a: usize, b: usize) -> f32 {
    let row_a = embeddings.row(a);
    let row_b = embeddings.row(b);
    row_a
        .iter()
        .zip(row_b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
