//! Batch prediction: fit a fresh estimator on the submitted batch and score
//! the same rows with it.
//!
//! The training target of each row is the mean of its own three scores.
//! Nothing is kept between batches, so the same raw scores can receive a
//! different mark when submitted alongside different students.

use linfa::prelude::*;
use ndarray::{Array1, Axis};

use crate::data::{BatchSubmission, NewStudentRecord};
use crate::error::PredictionError;
use crate::model::GradientBoostingParams;

#[derive(Debug, Clone, Default)]
pub struct PredictionPipeline {
    params: GradientBoostingParams,
}

impl PredictionPipeline {
    pub fn new(params: GradientBoostingParams) -> Self {
        Self { params }
    }

    /// Predicted marks aligned 1:1 with the batch order.
    pub fn predict_marks(&self, batch: &BatchSubmission) -> Result<Vec<f64>, PredictionError> {
        if batch.is_empty() {
            return Err(PredictionError::EmptyBatch);
        }

        let features = batch.feature_matrix()?;
        let targets: Array1<f64> = features
            .mean_axis(Axis(1))
            .ok_or(PredictionError::EmptyBatch)?;

        let dataset = Dataset::new(features, targets);
        let model = self.params.fit(&dataset)?;
        let marks = model.predict(dataset.records());

        tracing::debug!(rows = batch.len(), trees = model.n_trees(), "fitted batch estimator");
        Ok(marks.to_vec())
    }

    /// Enrich every entry of the batch with its predicted mark.
    pub fn run(&self, batch: &BatchSubmission) -> Result<Vec<NewStudentRecord>, PredictionError> {
        let marks = self.predict_marks(batch)?;
        Ok(batch
            .students
            .iter()
            .cloned()
            .zip(marks)
            .map(|(entry, predicted_mark)| NewStudentRecord { entry, predicted_mark })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StudentEntry;

    fn entry(id: &str, cia1: i64, cia2: i64, model_exam: i64) -> StudentEntry {
        StudentEntry {
            student_id: id.to_string(),
            name: format!("Student {}", id),
            subject: "Math".to_string(),
            cia1,
            cia2,
            model_exam,
        }
    }

    #[test]
    fn test_single_row_gets_its_own_mean() {
        let batch = BatchSubmission::new(vec![entry("S1", 10, 10, 10)]).unwrap();
        let records = PredictionPipeline::default().run(&batch).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].predicted_mark, 10.0);

        let batch = BatchSubmission::new(vec![entry("S2", 30, 45, 12)]).unwrap();
        let marks = PredictionPipeline::default().predict_marks(&batch).unwrap();
        assert_eq!(marks, vec![(30.0 + 45.0 + 12.0) / 3.0]);
    }

    #[test]
    fn test_identical_rows_get_identical_marks() {
        let batch = BatchSubmission::new(vec![entry("S1", 20, 20, 20), entry("S2", 20, 20, 20)]).unwrap();
        let marks = PredictionPipeline::default().predict_marks(&batch).unwrap();
        assert_eq!(marks, vec![20.0, 20.0]);
    }

    #[test]
    fn test_output_aligned_with_input_order() {
        let batch = BatchSubmission::new(vec![
            entry("S1", 45, 48, 50),
            entry("S2", 5, 8, 2),
            entry("S3", 25, 28, 30),
        ])
        .unwrap();
        let records = PredictionPipeline::default().run(&batch).unwrap();

        let ids: Vec<&str> = records.iter().map(|r| r.entry.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S3"]);
        assert!(records[0].predicted_mark > 40.0);
        assert!(records[1].predicted_mark <= 20.0);
        assert!(records[2].predicted_mark > 20.0 && records[2].predicted_mark <= 30.0);
    }

    #[test]
    fn test_empty_batch_is_prediction_error() {
        let batch = BatchSubmission { students: Vec::new() };
        let err = PredictionPipeline::default().predict_marks(&batch).unwrap_err();
        assert!(matches!(err, PredictionError::EmptyBatch));
    }
}
