use serde::Serialize;

use crate::error::{RefrainError, Result};
use crate::model::cosine_similarity;

use super::CoverEmbedding;

/// One row of the ROC sweep: predict "same song" when similarity ≥ threshold.
#[derive(Debug, Clone, Serialize)]
pub struct RocPoint {
    pub threshold: f32,
    pub tpr: f32,
    pub fpr: f32,
}

/// Classifier quality over all cover pairs at a fixed threshold.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifierReport {
    pub threshold: f32,
    pub accuracy: f32,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// Similarity and ground truth for every unordered cover pair.
fn pair_scores(embeddings: &[CoverEmbedding]) -> Vec<(f32, bool)> {
    let mut pairs = Vec::new();
    for i in 0..embeddings.len() {
        for j in i + 1..embeddings.len() {
            let score = cosine_similarity(&embeddings[i].embedding, &embeddings[j].embedding);
            let same = embeddings[i].song_id == embeddings[j].song_id;
            pairs.push((score, same));
        }
    }
    pairs
}

/// ROC sweep over all pair similarities, one point per distinct score,
/// ordered by descending threshold (ascending tpr).
pub fn roc_curve(embeddings: &[CoverEmbedding]) -> Result<Vec<RocPoint>> {
    let mut pairs = pair_scores(embeddings);
    let n_pos = pairs.iter().filter(|(_, same)| *same).count();
    let n_neg = pairs.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(RefrainError::Eval(
            "evaluation set needs both same-song and different-song pairs".to_string(),
        ));
    }

    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut points = Vec::new();
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut i = 0;
    while i < pairs.len() {
        let threshold = pairs[i].0;
        // Consume every pair tied at this score before emitting the point.
        while i < pairs.len() && pairs[i].0 == threshold {
            if pairs[i].1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push(RocPoint {
            threshold,
            tpr: tp as f32 / n_pos as f32,
            fpr: fp as f32 / n_neg as f32,
        });
    }

    Ok(points)
}

/// Area under the ROC curve (trapezoid rule over fpr).
#[must_use]
pub fn auc(points: &[RocPoint]) -> f32 {
    let mut area = 0.0f32;
    let mut prev_fpr = 0.0f32;
    let mut prev_tpr = 0.0f32;
    for point in points {
        area += (point.fpr - prev_fpr) * (point.tpr + prev_tpr) / 2.0;
        prev_fpr = point.fpr;
        prev_tpr = point.tpr;
    }
    area += (1.0 - prev_fpr) * (1.0 + prev_tpr) / 2.0;
    area
}

/// First ROC row clearing 70% true-positive rate, used as the default
/// classification threshold when none is configured.
#[must_use]
pub fn pick_threshold(points: &[RocPoint]) -> Option<f32> {
    points.iter().find(|p| p.tpr > 0.7).map(|p| p.threshold)
}

/// Mean reciprocal rank: for every cover, rank all other covers by
/// similarity and score the position of the first same-song hit.
///
/// Covers whose song has no other cover in the set are skipped as queries.
pub fn mean_reciprocal_rank(embeddings: &[CoverEmbedding]) -> Result<f32> {
    let mut total = 0.0f64;
    let mut queries = 0usize;

    for (qi, query) in embeddings.iter().enumerate() {
        let mut scored: Vec<(f32, bool)> = embeddings
            .iter()
            .enumerate()
            .filter(|(ci, _)| *ci != qi)
            .map(|(_, candidate)| {
                (
                    cosine_similarity(&query.embedding, &candidate.embedding),
                    candidate.song_id == query.song_id,
                )
            })
            .collect();
        if !scored.iter().any(|(_, same)| *same) {
            continue;
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        if let Some(rank) = scored.iter().position(|(_, same)| *same) {
            total += 1.0 / (rank as f64 + 1.0);
        }
        queries += 1;
    }

    if queries == 0 {
        return Err(RefrainError::Eval(
            "no query cover has a same-song candidate".to_string(),
        ));
    }
    Ok((total / queries as f64) as f32)
}

/// Mean average precision over the same query set as `mean_reciprocal_rank`.
pub fn mean_average_precision(embeddings: &[CoverEmbedding]) -> Result<f32> {
    let mut total = 0.0f64;
    let mut queries = 0usize;

    for (qi, query) in embeddings.iter().enumerate() {
        let mut scored: Vec<(f32, bool)> = embeddings
            .iter()
            .enumerate()
            .filter(|(ci, _)| *ci != qi)
            .map(|(_, candidate)| {
                (
                    cosine_similarity(&query.embedding, &candidate.embedding),
                    candidate.song_id == query.song_id,
                )
            })
            .collect();
        let n_relevant = scored.iter().filter(|(_, same)| *same).count();
        if n_relevant == 0 {
            continue;
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut hits = 0usize;
        let mut precision_sum = 0.0f64;
        for (rank, (_, same)) in scored.iter().enumerate() {
            if *same {
                hits += 1;
                precision_sum += hits as f64 / (rank as f64 + 1.0);
            }
        }
        total += precision_sum / n_relevant as f64;
        queries += 1;
    }

    if queries == 0 {
        return Err(RefrainError::Eval(
            "no query cover has a same-song candidate".to_string(),
        ));
    }
    Ok((total / queries as f64) as f32)
}

/// Same-song decision at a fixed similarity threshold.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdClassifier {
    pub threshold: f32,
}

impl ThresholdClassifier {
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub fn same_song(&self, a: &[f32], b: &[f32]) -> bool {
        cosine_similarity(a, b) >= self.threshold
    }

    /// Confusion-matrix metrics over every unordered cover pair.
    pub fn metrics(&self, embeddings: &[CoverEmbedding]) -> Result<ClassifierReport> {
        let pairs = pair_scores(embeddings);
        if pairs.is_empty() {
            return Err(RefrainError::Eval(
                "need at least two covers to classify pairs".to_string(),
            ));
        }

        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut tn = 0usize;
        let mut fn_ = 0usize;
        for (score, same) in pairs {
            let predicted = score >= self.threshold;
            match (predicted, same) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
        }

        let total = (tp + fp + tn + fn_) as f32;
        let precision = if tp + fp == 0 {
            0.0
        } else {
            tp as f32 / (tp + fp) as f32
        };
        let recall = if tp + fn_ == 0 {
            0.0
        } else {
            tp as f32 / (tp + fn_) as f32
        };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Ok(ClassifierReport {
            threshold: self.threshold,
            accuracy: (tp + tn) as f32 / total,
            precision,
            recall,
            f1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(song_id: &str, cover_id: &str, vector: &[f32]) -> CoverEmbedding {
        CoverEmbedding {
            song_id: song_id.to_string(),
            cover_id: cover_id.to_string(),
            embedding: vector.to_vec(),
        }
    }

    /// Two songs, two covers each, perfectly separated clusters.
    fn separated() -> Vec<CoverEmbedding> {
        vec![
            embedding("a", "1", &[1.0, 0.0]),
            embedding("a", "2", &[0.99, 0.05]),
            embedding("b", "1", &[0.0, 1.0]),
            embedding("b", "2", &[0.05, 0.99]),
        ]
    }

    #[test]
    fn separated_clusters_rank_perfectly() {
        let embeddings = separated();
        let mrr = mean_reciprocal_rank(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        let map = mean_average_precision(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        assert!((mrr - 1.0).abs() < 1e-6);
        assert!((map - 1.0).abs() < 1e-6);
    }

    #[test]
    fn separated_clusters_have_unit_auc() {
        let embeddings = separated();
        let points = roc_curve(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        assert!((auc(&points) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn misplaced_cover_lowers_mrr() {
        let mut embeddings = separated();
        // Move one cover of song a into song b's cluster.
        embeddings[1].embedding = vec![0.0, 1.0];
        let mrr = mean_reciprocal_rank(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        assert!(mrr < 1.0);
    }

    #[test]
    fn single_song_set_is_eval_error() {
        let embeddings = vec![
            embedding("a", "1", &[1.0, 0.0]),
            embedding("a", "2", &[0.9, 0.1]),
        ];
        assert!(roc_curve(&embeddings).is_err());
    }

    #[test]
    fn singleton_songs_are_skipped_as_queries() {
        let embeddings = vec![
            embedding("a", "1", &[1.0, 0.0]),
            embedding("a", "2", &[0.98, 0.02]),
            embedding("loner", "1", &[0.5, 0.5]),
        ];
        let mrr = mean_reciprocal_rank(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        assert!(mrr > 0.0);
    }

    #[test]
    fn roc_is_monotone_in_tpr() {
        let embeddings = separated();
        let points = roc_curve(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        for pair in points.windows(2) {
            assert!(pair[0].tpr <= pair[1].tpr);
            assert!(pair[0].threshold >= pair[1].threshold);
        }
    }

    #[test]
    fn pick_threshold_clears_seventy_percent_tpr() {
        let embeddings = separated();
        let points = roc_curve(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        let threshold = pick_threshold(&points).unwrap_or_else(|| panic!("no threshold"));
        let hit = points
            .iter()
            .find(|p| p.threshold == threshold)
            .unwrap_or_else(|| panic!("threshold not on curve"));
        assert!(hit.tpr > 0.7);
    }

    #[test]
    fn perfect_classifier_report() {
        let embeddings = separated();
        let clf = ThresholdClassifier::new(0.8);
        let report = clf.metrics(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        assert!((report.accuracy - 1.0).abs() < 1e-6);
        assert!((report.precision - 1.0).abs() < 1e-6);
        assert!((report.recall - 1.0).abs() < 1e-6);
        assert!((report.f1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn everything_same_predictions_have_low_precision() {
        let embeddings = separated();
        let clf = ThresholdClassifier::new(-1.0);
        let report = clf.metrics(&embeddings).unwrap_or_else(|e| panic!("{e}"));
        assert!((report.recall - 1.0).abs() < 1e-6);
        assert!(report.precision < 0.5);
    }

    #[test]
    fn classifier_same_song_uses_threshold() {
        let clf = ThresholdClassifier::new(0.9);
        assert!(clf.same_song(&[1.0, 0.0], &[1.0, 0.0]));
        assert!(!clf.same_song(&[1.0, 0.0], &[0.0, 1.0]));
    }
}
