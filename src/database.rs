use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::data::{NewStudentRecord, StudentRecord};
use crate::error::StorageError;

const CREATE_STUDENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS students (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        student_id TEXT,
        name TEXT,
        subject TEXT,
        cia1 INTEGER,
        cia2 INTEGER,
        model_exam INTEGER,
        predicted_mark REAL
    )
"#;

const SELECT_STUDENTS: &str = r#"
    SELECT id, student_id, name, subject, cia1, cia2, model_exam, predicted_mark
    FROM students
    ORDER BY id ASC
"#;

/// Record store over the `students` table.
///
/// Every operation checks a connection out of the pool and hands it back
/// when the operation returns, on success and on error alike.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url` and ensure the schema exists.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.init_schema().await?;
        info!(url, "record store ready");
        Ok(db)
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let db = Database { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(CREATE_STUDENTS).execute(&mut *conn).await?;
        Ok(())
    }

    /// Insert every record and return them with their assigned ids.
    ///
    /// Rows are committed one at a time: a failure part way through leaves
    /// the rows inserted before it in place.
    pub async fn insert_batch(
        &self,
        records: Vec<NewStudentRecord>,
    ) -> Result<Vec<StudentRecord>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let mut stored = Vec::with_capacity(records.len());

        for record in records {
            let id = sqlx::query(
                r#"
                INSERT INTO students (student_id, name, subject, cia1, cia2, model_exam, predicted_mark)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.entry.student_id)
            .bind(&record.entry.name)
            .bind(&record.entry.subject)
            .bind(record.entry.cia1)
            .bind(record.entry.cia2)
            .bind(record.entry.model_exam)
            .bind(record.predicted_mark)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

            debug!(id, student_id = %record.entry.student_id, "inserted student record");
            stored.push(StudentRecord::from_new(id, record));
        }

        Ok(stored)
    }

    /// All records ordered by id ascending.
    pub async fn list_all(&self) -> Result<Vec<StudentRecord>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let records = sqlx::query_as::<_, StudentRecord>(SELECT_STUDENTS)
            .fetch_all(&mut *conn)
            .await?;
        Ok(records)
    }

    /// Remove the record with `id`. Returns whether a row was removed;
    /// an unknown id is not an error.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let affected = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        debug!(id, affected, "delete student record");
        Ok(affected > 0)
    }

    /// Consistent snapshot of the whole table for spreadsheet export.
    pub async fn export_all(&self) -> Result<Vec<StudentRecord>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let records = sqlx::query_as::<_, StudentRecord>(SELECT_STUDENTS)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(records)
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM students")
            .fetch_one(&mut *conn)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
