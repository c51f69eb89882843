use calamine::{Data, Reader, Xlsx};
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::info;

use crate::data::StudentRecord;
use crate::error::ExportError;

const SHEET_NAME: &str = "Students";

const HEADER: [&str; 8] = [
    "id",
    "student_id",
    "name",
    "subject",
    "cia1",
    "cia2",
    "model_exam",
    "predicted_mark",
];

/// Writes the xlsx export to one fixed path, one writer at a time.
pub struct Exporter {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Exporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "student_records.xlsx".to_string())
    }

    /// Replace the export file with a workbook of `records` and return its bytes.
    ///
    /// The workbook is written to a temporary file next to the target and
    /// renamed over it, so readers of the fixed path never see a partial file.
    pub fn write_records(&self, records: &[StudentRecord]) -> Result<Vec<u8>, ExportError> {
        let bytes = build_workbook(records)?;

        let _guard = self.write_lock.lock().map_err(|_| ExportError::LockPoisoned)?;
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(path = %self.path.display(), rows = records.len(), "spreadsheet export written");
        Ok(bytes)
    }
}

fn build_workbook(records: &[StudentRecord]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, title) in HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *title)?;
    }
    for (i, record) in records.iter().enumerate() {
        write_row(sheet, i as u32 + 1, record)?;
    }

    workbook.save_to_buffer()
}

// Integers are stored as numbers; every column value here fits in an f64 exactly.
fn write_row(sheet: &mut Worksheet, row: u32, record: &StudentRecord) -> Result<(), XlsxError> {
    sheet.write_number(row, 0, record.id as f64)?;
    sheet.write_string(row, 1, record.student_id.as_str())?;
    sheet.write_string(row, 2, record.name.as_str())?;
    sheet.write_string(row, 3, record.subject.as_str())?;
    sheet.write_number(row, 4, record.cia1 as f64)?;
    sheet.write_number(row, 5, record.cia2 as f64)?;
    sheet.write_number(row, 6, record.model_exam as f64)?;
    sheet.write_number(row, 7, record.predicted_mark)?;
    Ok(())
}

/// Read an export file back into records.
pub fn read_records(path: &Path) -> Result<Vec<StudentRecord>, ExportError> {
    let workbook: Xlsx<_> = calamine::open_workbook(path)?;
    parse_workbook(workbook)
}

/// Same as [`read_records`], for a workbook held in memory (e.g. a download body).
pub fn read_records_from_bytes(bytes: &[u8]) -> Result<Vec<StudentRecord>, ExportError> {
    let workbook = Xlsx::new(Cursor::new(bytes))?;
    parse_workbook(workbook)
}

fn parse_workbook<RS: Read + Seek>(mut workbook: Xlsx<RS>) -> Result<Vec<StudentRecord>, ExportError> {
    let range = workbook.worksheet_range_at(0).ok_or(ExportError::MissingSheet)??;
    let mut rows = range.rows();

    let header: Vec<String> = rows
        .next()
        .map(|cells| cells.iter().map(|c| c.to_string()).collect())
        .unwrap_or_default();
    if header != HEADER {
        return Err(ExportError::Header(header));
    }

    rows.enumerate()
        .map(|(i, cells)| parse_row(i + 1, cells))
        .collect()
}

fn parse_row(row: usize, cells: &[Data]) -> Result<StudentRecord, ExportError> {
    let cell = |col: usize| cells.get(col).unwrap_or(&Data::Empty);
    Ok(StudentRecord {
        id: int_cell(row, 0, cell(0))?,
        student_id: text_cell(row, 1, cell(1))?,
        name: text_cell(row, 2, cell(2))?,
        subject: text_cell(row, 3, cell(3))?,
        cia1: int_cell(row, 4, cell(4))?,
        cia2: int_cell(row, 5, cell(5))?,
        model_exam: int_cell(row, 6, cell(6))?,
        predicted_mark: float_cell(row, 7, cell(7))?,
    })
}

fn bad_cell(row: usize, col: usize) -> ExportError {
    ExportError::Cell { row, column: HEADER[col] }
}

fn text_cell(row: usize, col: usize, data: &Data) -> Result<String, ExportError> {
    match data {
        Data::String(s) => Ok(s.clone()),
        Data::Empty => Ok(String::new()),
        _ => Err(bad_cell(row, col)),
    }
}

fn int_cell(row: usize, col: usize, data: &Data) -> Result<i64, ExportError> {
    match data {
        Data::Int(v) => Ok(*v),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 => Ok(*v as i64),
        _ => Err(bad_cell(row, col)),
    }
}

fn float_cell(row: usize, col: usize, data: &Data) -> Result<f64, ExportError> {
    match data {
        Data::Float(v) => Ok(*v),
        Data::Int(v) => Ok(*v as f64),
        _ => Err(bad_cell(row, col)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(id: i64, name: &str, mark: f64) -> StudentRecord {
        StudentRecord {
            id,
            student_id: format!("S{}", id),
            name: name.to_string(),
            subject: "Physics".to_string(),
            cia1: 12,
            cia2: 31,
            model_exam: 47,
            predicted_mark: mark,
        }
    }

    #[test]
    fn test_export_reimports_exact_values() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("static").join("student_records.xlsx"));
        let records = vec![
            stored(1, "Plain", 30.0),
            stored(2, "Comma, Quote \"Q\" <tag>", 29.999_999_123_456_78),
            stored(7, "Ünïcode", 0.1 + 0.2),
        ];

        let bytes = exporter.write_records(&records).unwrap();
        assert_eq!(read_records(exporter.path()).unwrap(), records);
        assert_eq!(read_records_from_bytes(&bytes).unwrap(), records);
    }

    #[test]
    fn test_export_is_xlsx_with_header_row() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("out.xlsx"));

        let bytes = exporter.write_records(&[stored(1, "A", 10.0)]).unwrap();
        // xlsx is a zip container
        assert!(bytes.starts_with(b"PK\x03\x04"));

        let mut workbook = Xlsx::new(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        assert_eq!(range.height(), 2);
        let header: Vec<String> = range.rows().next().unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(header, HEADER);
    }

    #[test]
    fn test_empty_export_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("out.xlsx"));

        exporter.write_records(&[]).unwrap();
        assert!(read_records(exporter.path()).unwrap().is_empty());
        assert_eq!(exporter.file_name(), "out.xlsx");
    }

    #[test]
    fn test_rewrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("out.xlsx"));

        exporter.write_records(&[stored(1, "A", 10.0)]).unwrap();
        exporter.write_records(&[stored(1, "A", 10.0), stored(2, "B", 20.0)]).unwrap();

        assert_eq!(read_records(exporter.path()).unwrap().len(), 2);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_foreign_workbook_is_rejected() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "something else").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        assert!(matches!(read_records_from_bytes(&bytes), Err(ExportError::Header(_))));
    }

    #[test]
    fn test_unwritable_path_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let exporter = Exporter::new(blocker.join("out.xlsx"));

        assert!(matches!(exporter.write_records(&[]), Err(ExportError::Io(_))));
    }
}
