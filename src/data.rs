use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{PredictionError, ValidationError};

pub const FEATURE_COLUMNS: [&str; 3] = ["cia1", "cia2", "model_exam"];

/// One student's raw scores for one subject, as submitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEntry {
    pub student_id: String,
    pub name: String,
    pub subject: String,
    pub cia1: i64,
    pub cia2: i64,
    pub model_exam: i64,
}

/// An entry enriched with its predicted mark, not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudentRecord {
    #[serde(flatten)]
    pub entry: StudentEntry,
    pub predicted_mark: f64,
}

/// A persisted row of the `students` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentRecord {
    pub id: i64,
    pub student_id: String,
    pub name: String,
    pub subject: String,
    pub cia1: i64,
    pub cia2: i64,
    pub model_exam: i64,
    pub predicted_mark: f64,
}

impl StudentRecord {
    pub fn from_new(id: i64, record: NewStudentRecord) -> Self {
        let NewStudentRecord { entry, predicted_mark } = record;
        Self {
            id,
            student_id: entry.student_id,
            name: entry.name,
            subject: entry.subject,
            cia1: entry.cia1,
            cia2: entry.cia2,
            model_exam: entry.model_exam,
            predicted_mark,
        }
    }
}

/// All entries of one form submission, in submission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    pub students: Vec<StudentEntry>,
}

impl BatchSubmission {
    pub fn new(students: Vec<StudentEntry>) -> Result<Self, ValidationError> {
        if students.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        Ok(Self { students })
    }

    /// Decode the indexed form layout: `num_students` plus
    /// `student_id_i`, `name_i`, `subject_i`, `cia1_i`, `cia2_i`, `model_exam_i`
    /// for every `i` below it. The whole batch is validated before returning.
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let declared = parse_int(form, "num_students")?;
        let declared = usize::try_from(declared).map_err(|_| ValidationError::NotAnInteger {
            field: "num_students".to_string(),
            value: declared.to_string(),
        })?;

        let students = (0..declared)
            .map(|i| {
                Ok(StudentEntry {
                    student_id: text(form, &format!("student_id_{}", i))?,
                    name: text(form, &format!("name_{}", i))?,
                    subject: text(form, &format!("subject_{}", i))?,
                    cia1: parse_int(form, &format!("cia1_{}", i))?,
                    cia2: parse_int(form, &format!("cia2_{}", i))?,
                    model_exam: parse_int(form, &format!("model_exam_{}", i))?,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Self::new(students)
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// Feature matrix with columns `cia1, cia2, model_exam`, one row per entry.
    pub fn feature_matrix(&self) -> Result<Array2<f64>, PredictionError> {
        let flat: Vec<f64> = self
            .students
            .iter()
            .flat_map(|s| [s.cia1 as f64, s.cia2 as f64, s.model_exam as f64])
            .collect();
        Ok(Array2::from_shape_vec((self.students.len(), FEATURE_COLUMNS.len()), flat)?)
    }
}

fn text(form: &HashMap<String, String>, field: &str) -> Result<String, ValidationError> {
    form.get(field)
        .cloned()
        .ok_or_else(|| ValidationError::MissingField(field.to_string()))
}

fn parse_int(form: &HashMap<String, String>, field: &str) -> Result<i64, ValidationError> {
    let raw = form
        .get(field)
        .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
    raw.trim().parse().map_err(|_| ValidationError::NotAnInteger {
        field: field.to_string(),
        value: raw.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn one_student() -> HashMap<String, String> {
        form(&[
            ("num_students", "1"),
            ("student_id_0", "S1"),
            ("name_0", "A"),
            ("subject_0", "Math"),
            ("cia1_0", "10"),
            ("cia2_0", " 12 "),
            ("model_exam_0", "14"),
        ])
    }

    #[test]
    fn test_from_form_decodes_entries() {
        let batch = BatchSubmission::from_form(&one_student()).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch.students[0],
            StudentEntry {
                student_id: "S1".to_string(),
                name: "A".to_string(),
                subject: "Math".to_string(),
                cia1: 10,
                cia2: 12,
                model_exam: 14,
            }
        );
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut fields = one_student();
        fields.remove("subject_0");
        let err = BatchSubmission::from_form(&fields).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(f) if f == "subject_0"));
    }

    #[test]
    fn test_non_numeric_score_rejected() {
        let mut fields = one_student();
        fields.insert("cia1_0".to_string(), "ten".to_string());
        let err = BatchSubmission::from_form(&fields).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnInteger { field, .. } if field == "cia1_0"));
    }

    #[test]
    fn test_declared_count_beyond_entries_rejected() {
        let mut fields = one_student();
        fields.insert("num_students".to_string(), "2".to_string());
        let err = BatchSubmission::from_form(&fields).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(f) if f == "student_id_1"));
    }

    #[test]
    fn test_zero_students_rejected() {
        let err = BatchSubmission::from_form(&form(&[("num_students", "0")])).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyBatch));

        let err = BatchSubmission::from_form(&form(&[("num_students", "-3")])).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnInteger { .. }));
    }

    #[test]
    fn test_feature_matrix_column_order() {
        let batch = BatchSubmission::from_form(&one_student()).unwrap();
        let features = batch.feature_matrix().unwrap();
        assert_eq!(features.shape(), &[1, 3]);
        assert_eq!(features.row(0).to_vec(), vec![10.0, 12.0, 14.0]);
    }
}
