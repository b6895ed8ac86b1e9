use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use crate::error::{KnowledgeError, Result};
use crate::store::KnowledgeStore;
use crate::types::{IngestionJob, JobStatus, PageStatus};

impl KnowledgeStore {
    #[instrument(skip(self))]
    pub fn create_job(&self, job_id: &str, document_id: &str, total_pages: u32) -> Result<()> {
        let conn = self.conn_lock();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO knowledge_jobs (job_id, document_id, total_pages, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![job_id, document_id, total_pages, JobStatus::Running.as_str(), now],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn record_page_result(&self, document_id: &str, page_number: u32, status: PageStatus) -> Result<()> {
        let conn = self.conn_lock();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO knowledge_page_status (document_id, page_number, status, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(document_id, page_number) DO UPDATE SET status = excluded.status, updated_at = excluded.updated_at",
            params![document_id, page_number, status.to_string(), now],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn increment_job_counters(&self, job_id: &str, status: PageStatus) -> Result<()> {
        let conn = self.conn_lock();
        let column = match status {
            PageStatus::Direct => "direct_pages",
            PageStatus::Vision => "vision_pages",
            PageStatus::Failed => "failed_pages",
            PageStatus::Skipped => "skipped_pages",
            PageStatus::Pending => return Ok(()),
        };
        conn.execute(
            &format!("UPDATE knowledge_jobs SET {column} = {column} + 1 WHERE job_id = ?1"),
            params![job_id],
        )?;
        if matches!(status, PageStatus::Direct | PageStatus::Vision) {
            conn.execute(
                "UPDATE knowledge_jobs SET successful_pages = successful_pages + 1 WHERE job_id = ?1",
                params![job_id],
            )?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn complete_job(&self, job_id: &str, status: JobStatus) -> Result<()> {
        let conn = self.conn_lock();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE knowledge_jobs SET status = ?1, completed_at = ?2 WHERE job_id = ?3",
            params![status.as_str(), now, job_id],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_job(&self, job_id: &str) -> Result<IngestionJob> {
        let conn = self.conn_lock();
        conn.query_row(
            "SELECT job_id, document_id, total_pages, successful_pages, failed_pages,
                    vision_pages, direct_pages, skipped_pages, status, started_at, completed_at
             FROM knowledge_jobs WHERE job_id = ?1",
            params![job_id],
            row_to_job,
        )
        .optional()?
        .ok_or_else(|| KnowledgeError::JobNotFound(job_id.to_string()))
    }
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<IngestionJob> {
    let status_str: String = row.get(8)?;
    Ok(IngestionJob {
        job_id: row.get(0)?,
        document_id: row.get(1)?,
        total_pages: row.get(2)?,
        successful_pages: row.get(3)?,
        failed_pages: row.get(4)?,
        vision_pages: row.get(5)?,
        direct_pages: row.get(6)?,
        skipped_pages: row.get(7)?,
        status: JobStatus::from_str(&status_str),
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_counters_and_status_round_trip() {
        let store = KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        store.create_job("job-1", "doc-1", 3).unwrap();
        store.increment_job_counters("job-1", PageStatus::Direct).unwrap();
        store.increment_job_counters("job-1", PageStatus::Vision).unwrap();
        store.increment_job_counters("job-1", PageStatus::Failed).unwrap();
        store.complete_job("job-1", JobStatus::Completed).unwrap();

        let job = store.get_job("job-1").unwrap();
        assert_eq!(job.direct_pages, 1);
        assert_eq!(job.vision_pages, 1);
        assert_eq!(job.failed_pages, 1);
        assert_eq!(job.successful_pages, 2);
        assert_eq!(job.status, JobStatus::Completed);
        assert!((job.api_savings_percent() - 33.333).abs() < 0.01);
    }
}
