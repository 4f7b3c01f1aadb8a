//! Classifier evaluation metrics
//!
//! Confusion matrix and accuracy for hard predictions; ROC curve and
//! trapezoidal AUC for scores. ROC needs both classes present in the
//! evaluated labels; a single-class evaluation set is an error rather
//! than a silent division by zero.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("labels and predictions differ in length: {labels} vs {predictions}")]
    LengthMismatch { labels: usize, predictions: usize },

    #[error("ROC is undefined: evaluation labels contain only class {0}")]
    SingleClass(u8),

    #[error("score at index {0} is not finite")]
    NonFiniteScore(usize),

    #[error("cannot evaluate an empty label set")]
    Empty,
}

pub type Result<T> = std::result::Result<T, MetricsError>;

/// Binary confusion matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_pos: usize,
    pub false_pos: usize,
    pub true_neg: usize,
    pub false_neg: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[u8], predictions: &[bool]) -> Result<Self> {
        if labels.len() != predictions.len() {
            return Err(MetricsError::LengthMismatch {
                labels: labels.len(),
                predictions: predictions.len(),
            });
        }
        if labels.is_empty() {
            return Err(MetricsError::Empty);
        }
        let mut matrix = ConfusionMatrix {
            true_pos: 0,
            false_pos: 0,
            true_neg: 0,
            false_neg: 0,
        };
        for (&label, &predicted) in labels.iter().zip(predictions.iter()) {
            match (label == 1, predicted) {
                (true, true) => matrix.true_pos += 1,
                (false, true) => matrix.false_pos += 1,
                (false, false) => matrix.true_neg += 1,
                (true, false) => matrix.false_neg += 1,
            }
        }
        Ok(matrix)
    }

    pub fn total(&self) -> usize {
        self.true_pos + self.false_pos + self.true_neg + self.false_neg
    }

    pub fn accuracy(&self) -> f64 {
        (self.true_pos + self.true_neg) as f64 / self.total() as f64
    }
}

/// One point on the ROC curve
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

/// ROC curve with its area under the curve
#[derive(Debug, Clone, Serialize)]
pub struct RocCurve {
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

/// Build the ROC curve by sweeping a decision threshold down through the
/// distinct scores
pub fn roc_curve(labels: &[u8], scores: &[f64]) -> Result<RocCurve> {
    if labels.len() != scores.len() {
        return Err(MetricsError::LengthMismatch {
            labels: labels.len(),
            predictions: scores.len(),
        });
    }
    if labels.is_empty() {
        return Err(MetricsError::Empty);
    }
    // NaN scores would stall the tie-group sweep below; reject them up front
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(MetricsError::NonFiniteScore(i));
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 {
        return Err(MetricsError::SingleClass(0));
    }
    if negatives == 0 {
        return Err(MetricsError::SingleClass(1));
    }

    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut points = vec![RocPoint {
        threshold: f64::INFINITY,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    }];
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut auc = 0.0;
    let (mut last_fpr, mut last_tpr) = (0.0f64, 0.0f64);

    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        // Consume every sample tied at this score before emitting a point
        while i < order.len() && scores[order[i]] == threshold {
            if labels[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let fpr = fp as f64 / negatives as f64;
        let tpr = tp as f64 / positives as f64;
        auc += (fpr - last_fpr) * (tpr + last_tpr) / 2.0;
        points.push(RocPoint {
            threshold,
            false_positive_rate: fpr,
            true_positive_rate: tpr,
        });
        last_fpr = fpr;
        last_tpr = tpr;
    }

    Ok(RocCurve { points, auc })
}
