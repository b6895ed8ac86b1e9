use rusqlite::Connection;

use crate::error::Result;

/// Creates the knowledge-base schema if it does not already exist.
///
/// `knowledge_chunks` holds the canonical row per chunk including the dense
/// embedding as a little-endian `f32` BLOB (no native ANN index is available
/// in SQLite, so dense search is a brute-force scan over this column —
/// see `store::dense_search`). `knowledge_chunks_fts` is an external-content
/// FTS5 table kept in sync by explicit insert/delete statements rather than
/// a trigger, so a failed write can be retried without leaving the index
/// half-updated.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_documents (
            document_id   TEXT PRIMARY KEY,
            title         TEXT,
            source_uri    TEXT,
            page_count    INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS knowledge_chunks (
            node_id       TEXT PRIMARY KEY,
            document_id   TEXT NOT NULL,
            page_number   INTEGER NOT NULL,
            chunk_index   INTEGER NOT NULL,
            content       TEXT NOT NULL,
            content_type  TEXT NOT NULL,
            confidence    REAL NOT NULL,
            embedding     BLOB NOT NULL,
            image_url     TEXT,
            bounding_boxes TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES knowledge_documents(document_id)
        );

        CREATE INDEX IF NOT EXISTS idx_knowledge_chunks_document
            ON knowledge_chunks (document_id, page_number, chunk_index);

        CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_chunks_fts USING fts5(
            content,
            content='knowledge_chunks',
            content_rowid='rowid'
        );

        CREATE TABLE IF NOT EXISTS knowledge_jobs (
            job_id          TEXT PRIMARY KEY,
            document_id     TEXT NOT NULL,
            total_pages     INTEGER NOT NULL DEFAULT 0,
            successful_pages INTEGER NOT NULL DEFAULT 0,
            failed_pages    INTEGER NOT NULL DEFAULT 0,
            vision_pages    INTEGER NOT NULL DEFAULT 0,
            direct_pages    INTEGER NOT NULL DEFAULT 0,
            skipped_pages   INTEGER NOT NULL DEFAULT 0,
            status          TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            completed_at    TEXT
        );

        CREATE TABLE IF NOT EXISTS knowledge_page_status (
            document_id   TEXT NOT NULL,
            page_number   INTEGER NOT NULL,
            status        TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            PRIMARY KEY (document_id, page_number)
        );
        "#,
    )?;
    Ok(())
}

/// Encodes a dense vector as a little-endian `f32` BLOB for storage.
pub fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a little-endian `f32` BLOB back into a dense vector.
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips_through_blob_encoding() {
        let original = vec![0.25_f32, -1.5, 3.0, 0.0];
        let encoded = encode_embedding(&original);
        let decoded = decode_embedding(&encoded);
        assert_eq!(original, decoded);
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
    }
}
