//! Evaluation metrics for the binary classifier.
//!
//! The metric set is fixed: accuracy, ROC AUC, precision and recall, computed
//! over the probabilities collected during a validation pass. Thresholded
//! metrics use 0.5; degenerate denominators yield 0.0 rather than NaN.

use std::fmt;

const THRESHOLD: f32 = 0.5;

/// Metrics of one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub loss: f32,
    pub accuracy: f32,
    pub auc: f32,
    pub precision: f32,
    pub recall: f32,
}

impl EpochMetrics {
    pub fn compute(probabilities: &[f32], labels: &[f32], loss: f32) -> Self {
        Self {
            loss,
            accuracy: accuracy(probabilities, labels),
            auc: roc_auc(probabilities, labels),
            precision: precision(probabilities, labels),
            recall: recall(probabilities, labels),
        }
    }
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loss: {:.6}, accuracy: {:.4}, auc: {:.4}, precision: {:.4}, recall: {:.4}",
            self.loss, self.accuracy, self.auc, self.precision, self.recall
        )
    }
}

fn confusion(probabilities: &[f32], labels: &[f32]) -> (usize, usize, usize, usize) {
    let mut tp = 0;
    let mut tn = 0;
    let mut fp = 0;
    let mut fn_ = 0;

    for (&p, &t) in probabilities.iter().zip(labels.iter()) {
        match (t >= THRESHOLD, p >= THRESHOLD) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
        }
    }

    (tp, tn, fp, fn_)
}

pub fn accuracy(probabilities: &[f32], labels: &[f32]) -> f32 {
    let (tp, tn, fp, fn_) = confusion(probabilities, labels);
    let total = tp + tn + fp + fn_;
    if total == 0 {
        return 0.0;
    }
    (tp + tn) as f32 / total as f32
}

pub fn precision(probabilities: &[f32], labels: &[f32]) -> f32 {
    let (tp, _, fp, _) = confusion(probabilities, labels);
    if tp + fp == 0 {
        return 0.0;
    }
    tp as f32 / (tp + fp) as f32
}

pub fn recall(probabilities: &[f32], labels: &[f32]) -> f32 {
    let (tp, _, _, fn_) = confusion(probabilities, labels);
    if tp + fn_ == 0 {
        return 0.0;
    }
    tp as f32 / (tp + fn_) as f32
}

/// Area under the ROC curve via the rank-sum statistic, averaging ranks over
/// tied scores. Returns 0.5 when either class is absent.
pub fn roc_auc(probabilities: &[f32], labels: &[f32]) -> f32 {
    let n = probabilities.len();
    let n_pos = labels.iter().filter(|&&t| t >= THRESHOLD).count();
    let n_neg = n - n_pos;

    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        probabilities[a]
            .partial_cmp(&probabilities[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Sum of positive ranks, with tied scores sharing their average rank
    let mut rank_sum = 0.0f64;
    let mut i = 0;
    while i < n {
        let score = probabilities[order[i]];
        let mut j = i;
        while j < n && probabilities[order[j]] == score {
            j += 1;
        }

        // Ranks are 1-based; every index in [i, j) gets the average rank
        let average_rank = ((i + 1) + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            if labels[idx] >= THRESHOLD {
                rank_sum += average_rank;
            }
        }

        i = j;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    let auc = (rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg);
    auc as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn it_counts_the_confusion_matrix() {
        let labels = [1.0, 0.0, 1.0, 1.0, 0.0, 0.0];
        let probabilities = [0.9, 0.1, 0.2, 0.8, 0.7, 0.3];

        assert_eq!(confusion(&probabilities, &labels), (2, 2, 1, 1));
        assert_relative_eq!(accuracy(&probabilities, &labels), 4.0 / 6.0);
        assert_relative_eq!(precision(&probabilities, &labels), 2.0 / 3.0);
        assert_relative_eq!(recall(&probabilities, &labels), 2.0 / 3.0);
    }

    #[test]
    fn it_scores_a_perfect_ranking() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        let probabilities = [0.1, 0.2, 0.8, 0.9];

        assert_relative_eq!(roc_auc(&probabilities, &labels), 1.0);
    }

    #[test]
    fn it_scores_an_inverted_ranking() {
        let labels = [1.0, 1.0, 0.0, 0.0];
        let probabilities = [0.1, 0.2, 0.8, 0.9];

        assert_relative_eq!(roc_auc(&probabilities, &labels), 0.0);
    }

    #[test]
    fn it_averages_ranks_over_ties() {
        // One positive and one negative share the score 0.5. Of the four
        // positive/negative pairs, three rank correctly and the tied pair
        // contributes 0.5: AUC = 3.5 / 4 = 0.875
        let labels = [0.0, 1.0, 0.0, 1.0];
        let probabilities = [0.2, 0.5, 0.5, 0.9];

        assert_relative_eq!(roc_auc(&probabilities, &labels), 0.875);
    }

    #[test]
    fn it_returns_chance_when_a_class_is_absent() {
        let labels = [1.0, 1.0];
        let probabilities = [0.4, 0.6];

        assert_relative_eq!(roc_auc(&probabilities, &labels), 0.5);
    }

    #[test]
    fn it_zeroes_degenerate_denominators() {
        // No predicted positives and no actual positives
        let labels = [0.0, 0.0];
        let probabilities = [0.1, 0.2];

        assert_relative_eq!(precision(&probabilities, &labels), 0.0);
        assert_relative_eq!(recall(&probabilities, &labels), 0.0);
        assert_relative_eq!(accuracy(&probabilities, &labels), 1.0);
    }

    #[test]
    fn it_formats_epoch_metrics() {
        let metrics = EpochMetrics {
            loss: 0.5,
            accuracy: 0.75,
            auc: 0.875,
            precision: 0.5,
            recall: 1.0,
        };

        let formatted = metrics.to_string();
        assert!(formatted.contains("auc: 0.8750"));
        assert!(formatted.contains("loss: 0.500000"));
    }
}
