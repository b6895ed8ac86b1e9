use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use crate::db::{decode_embedding, encode_embedding};
use crate::error::{KnowledgeError, Result};
use crate::types::{BoundingBox, Citation, ContentType, DocumentChunk, EvidenceImage, SearchFilters, SearchHit, SearchResult};

const MAX_EVIDENCE_IMAGES_HARD_CAP: usize = 5;

/// Owns the SQLite connection backing the knowledge base: chunk storage,
/// the FTS5 lexical index kept in lockstep with it, and hybrid search.
pub struct KnowledgeStore {
    conn: Mutex<rusqlite::Connection>,
}

impl KnowledgeStore {
    pub fn new(conn: rusqlite::Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn_lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().expect("knowledge db lock poisoned")
    }

    #[instrument(skip(self))]
    pub fn register_document(&self, document_id: &str, title: Option<&str>, source_uri: Option<&str>, page_count: u32) -> Result<()> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO knowledge_documents (document_id, title, source_uri, page_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(document_id) DO UPDATE SET page_count = excluded.page_count, updated_at = excluded.updated_at",
            params![document_id, title, source_uri, page_count, now],
        )?;
        Ok(())
    }

    /// Inserts a batch of chunks transactionally: either every chunk in
    /// `chunks` lands (BLOB row + FTS row), or none does. Used for per-page
    /// ingestion writes so a crash mid-page cannot leave a partial page.
    #[instrument(skip(self, chunks), fields(count = chunks.len()))]
    pub fn insert_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        for chunk in chunks {
            chunk.validate().map_err(KnowledgeError::InvalidChunk)?;
        }
        let mut conn = self.conn.lock().expect("knowledge db lock poisoned");
        let tx = conn.transaction()?;
        for chunk in chunks {
            let bbox_json = if chunk.bounding_boxes.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&chunk.bounding_boxes)?)
            };
            tx.execute(
                "INSERT INTO knowledge_chunks
                    (node_id, document_id, page_number, chunk_index, content, content_type,
                     confidence, embedding, image_url, bounding_boxes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                 ON CONFLICT(node_id) DO UPDATE SET
                    content = excluded.content,
                    confidence = excluded.confidence,
                    embedding = excluded.embedding,
                    image_url = excluded.image_url,
                    bounding_boxes = excluded.bounding_boxes,
                    updated_at = excluded.updated_at",
                params![
                    chunk.node_id,
                    chunk.document_id,
                    chunk.page_number,
                    chunk.chunk_index,
                    chunk.content,
                    chunk.content_type.to_string(),
                    chunk.confidence,
                    encode_embedding(&chunk.embedding),
                    chunk.image_url,
                    bbox_json,
                    chunk.created_at,
                ],
            )?;
            let rowid: i64 = tx.query_row(
                "SELECT rowid FROM knowledge_chunks WHERE node_id = ?1",
                params![chunk.node_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "DELETE FROM knowledge_chunks_fts WHERE rowid = ?1",
                params![rowid],
            )?;
            tx.execute(
                "INSERT INTO knowledge_chunks_fts (rowid, content) VALUES (?1, ?2)",
                params![rowid, chunk.content],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// True if at least one chunk already exists for `(document_id, page_number)` —
    /// the basis for ingestion resume semantics.
    #[instrument(skip(self))]
    pub fn page_has_chunks(&self, document_id: &str, page_number: u32) -> Result<bool> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM knowledge_chunks WHERE document_id = ?1 AND page_number = ?2",
            params![document_id, page_number],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    #[instrument(skip(self))]
    pub fn get_chunk(&self, node_id: &str) -> Result<DocumentChunk> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        conn.query_row(
            "SELECT node_id, document_id, page_number, chunk_index, content, content_type,
                    confidence, embedding, image_url, bounding_boxes, created_at, updated_at
             FROM knowledge_chunks WHERE node_id = ?1",
            params![node_id],
            row_to_chunk,
        )
        .optional()?
        .ok_or_else(|| KnowledgeError::ChunkNotFound(node_id.to_string()))
    }

    /// Paged chunk listing with optional `document_id`/`content_type`/`page_number`
    /// filters, for `GET /api/v1/sources/`. Returns `(page_of_chunks, total_matching)`.
    #[instrument(skip(self))]
    pub fn list_chunks(
        &self,
        document_id: Option<&str>,
        content_type: Option<ContentType>,
        page_number: Option<u32>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<DocumentChunk>, u64)> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT node_id, document_id, page_number, chunk_index, content, content_type,
                    confidence, embedding, image_url, bounding_boxes, created_at, updated_at
             FROM knowledge_chunks",
        )?;
        let content_type_str = content_type.map(|c| c.to_string());
        let all: Vec<DocumentChunk> = stmt
            .query_map([], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|c| document_id.map_or(true, |d| c.document_id == d))
            .filter(|c| content_type_str.as_deref().map_or(true, |ct| c.content_type.to_string() == ct))
            .filter(|c| page_number.map_or(true, |p| c.page_number == p))
            .collect();
        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    #[instrument(skip(self))]
    pub fn stats(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let documents: i64 = conn.query_row("SELECT COUNT(*) FROM knowledge_documents", [], |row| row.get(0))?;
        let chunks: i64 = conn.query_row("SELECT COUNT(*) FROM knowledge_chunks", [], |row| row.get(0))?;
        Ok((documents, chunks))
    }

    /// Every registered document with its chunk count, for `GET /api/v1/
    /// knowledge/list`.
    #[instrument(skip(self))]
    pub fn list_documents(&self) -> Result<Vec<crate::types::DocumentSummary>> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT d.document_id, d.title, d.page_count,
                    (SELECT COUNT(*) FROM knowledge_chunks c WHERE c.document_id = d.document_id) AS chunk_count,
                    d.created_at
             FROM knowledge_documents d
             ORDER BY d.created_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(crate::types::DocumentSummary {
                    document_id: row.get(0)?,
                    title: row.get(1)?,
                    page_count: row.get(2)?,
                    chunk_count: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Brute-force cosine similarity over every stored embedding, returning
    /// the top `k` by score descending. SQLite has no native vector index;
    /// this is the documented scaling limit of the store.
    #[instrument(skip(self))]
    pub fn dense_search(&self, query_embedding: &[f32], k: usize, filters: &SearchFilters) -> Result<Vec<(DocumentChunk, f64)>> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT node_id, document_id, page_number, chunk_index, content, content_type,
                    confidence, embedding, image_url, bounding_boxes, created_at, updated_at
             FROM knowledge_chunks",
        )?;
        let mut scored: Vec<(DocumentChunk, f64)> = stmt
            .query_map([], row_to_chunk)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|chunk| passes_filters(chunk, filters))
            .map(|chunk| {
                let score = cosine_similarity(query_embedding, &chunk.embedding);
                (chunk, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// FTS5 `MATCH` lexical search, scored by `-bm25()` (higher is better).
    #[instrument(skip(self))]
    pub fn lexical_search(&self, query: &str, k: usize, filters: &SearchFilters) -> Result<Vec<(DocumentChunk, f64)>> {
        let conn = self.conn.lock().expect("knowledge db lock poisoned");
        let sanitized = sanitize_fts_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT c.node_id, c.document_id, c.page_number, c.chunk_index, c.content, c.content_type,
                    c.confidence, c.embedding, c.image_url, c.bounding_boxes, c.created_at, c.updated_at,
                    -bm25(knowledge_chunks_fts) AS score
             FROM knowledge_chunks_fts
             JOIN knowledge_chunks c ON c.rowid = knowledge_chunks_fts.rowid
             WHERE knowledge_chunks_fts MATCH ?1
             ORDER BY score DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![sanitized, k as i64], |row| {
                let chunk = row_to_chunk(row)?;
                let score: f64 = row.get(12)?;
                Ok((chunk, score))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|(chunk, _)| passes_filters(chunk, filters))
            .collect();
        Ok(rows)
    }

    /// Hybrid retrieval: dense top-`dense_k` + lexical top-`lexical_k`, fused
    /// as `alpha * dense + (1 - alpha) * lexical`, filtered, then truncated
    /// to `top_k` ordered by fused score desc, ties broken by
    /// `(page_number, chunk_index)` ascending. The dense score is the raw
    /// cosine similarity (already in `[0, 1]` for non-negative embeddings);
    /// the lexical score is normalized by dividing every candidate's bm25
    /// score by the top score in the candidate set, so the best lexical
    /// match is always 1.0 and the rest are proportional to it.
    #[instrument(skip(self, query_embedding))]
    #[allow(clippy::too_many_arguments)]
    pub fn hybrid_search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        dense_k: usize,
        lexical_k: usize,
        alpha: f64,
        filters: &SearchFilters,
    ) -> Result<SearchResult> {
        let dense = self.dense_search(query_embedding, dense_k, filters)?;
        let lexical = self.lexical_search(query_text, lexical_k, filters)?;

        let dense_norm: Vec<f64> = dense.iter().map(|(_, s)| *s).collect();
        let lexical_norm = normalize_by_top_score(lexical.iter().map(|(_, s)| *s).collect());

        let mut by_node: std::collections::HashMap<String, SearchHit> = std::collections::HashMap::new();
        for ((chunk, _), norm) in dense.iter().zip(dense_norm.iter()) {
            by_node.insert(
                chunk.node_id.clone(),
                SearchHit {
                    chunk: chunk.clone(),
                    dense_score: *norm,
                    lexical_score: 0.0,
                    fused_score: 0.0,
                },
            );
        }
        for ((chunk, _), norm) in lexical.iter().zip(lexical_norm.iter()) {
            by_node
                .entry(chunk.node_id.clone())
                .and_modify(|hit| hit.lexical_score = *norm)
                .or_insert_with(|| SearchHit {
                    chunk: chunk.clone(),
                    dense_score: 0.0,
                    lexical_score: *norm,
                    fused_score: 0.0,
                });
        }

        let mut hits: Vec<SearchHit> = by_node
            .into_values()
            .map(|mut hit| {
                hit.fused_score = alpha * hit.dense_score + (1.0 - alpha) * hit.lexical_score;
                hit
            })
            .filter(|hit| hit.fused_score >= filters.min_score)
            .collect();

        hits.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.page_number.cmp(&b.chunk.page_number))
                .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        hits.truncate(top_k);

        let citations = assemble_citations(&hits);
        let evidence_images = collect_evidence_images(&citations);

        Ok(SearchResult {
            hits,
            citations,
            evidence_images,
        })
    }
}

fn passes_filters(chunk: &DocumentChunk, filters: &SearchFilters) -> bool {
    if let Some(doc_id) = &filters.document_id {
        if &chunk.document_id != doc_id {
            return false;
        }
    }
    if let Some(types) = &filters.content_types {
        if !types.contains(&chunk.content_type) {
            return false;
        }
    }
    if let Some((lo, hi)) = filters.page_range {
        if chunk.page_number < lo || chunk.page_number > hi {
            return false;
        }
    }
    true
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Divides every score by the top score in the set so the best candidate
/// lands at 1.0 and the rest stay proportional to it, rather than min-max
/// rescaling, which would force the weakest candidate to 0 and let a
/// zero-scored chunk on the other side of the fusion tie with it.
fn normalize_by_top_score(scores: Vec<f64>) -> Vec<f64> {
    if scores.is_empty() {
        return scores;
    }
    let top = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if top <= 0.0 {
        return scores.iter().map(|_| 0.0).collect();
    }
    scores.iter().map(|s| s / top).collect()
}

/// FTS5 query syntax treats `" : ( ) * ^` specially; strip them so a raw
/// user question never produces a syntax error from the MATCH clause.
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '\'')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Groups hits by `(document_id, page_number)`, concatenates their trimmed
/// content in `chunk_index` order, unions bounding boxes, takes the max
/// fused score as the citation's relevance, and caps the whole set of
/// citations at `MAX_EVIDENCE_IMAGES_HARD_CAP` distinct page images.
fn assemble_citations(hits: &[SearchHit]) -> Vec<Citation> {
    let mut groups: std::collections::BTreeMap<(String, u32), Vec<&SearchHit>> = std::collections::BTreeMap::new();
    for hit in hits {
        groups
            .entry((hit.chunk.document_id.clone(), hit.chunk.page_number))
            .or_default()
            .push(hit);
    }

    let mut citations: Vec<Citation> = groups
        .into_values()
        .map(|mut members| {
            members.sort_by_key(|h| h.chunk.chunk_index);
            let first = members[0];
            let content_snippet = join_snippet_members(&members);
            let bounding_boxes: Vec<BoundingBox> = members
                .iter()
                .flat_map(|h| h.chunk.bounding_boxes.clone())
                .collect();
            let relevance_score = members
                .iter()
                .map(|h| h.fused_score)
                .fold(f64::NEG_INFINITY, f64::max);
            Citation {
                document_id: first.chunk.document_id.clone(),
                page_number: first.chunk.page_number,
                node_ids: members.iter().map(|h| h.chunk.node_id.clone()).collect(),
                content_snippet,
                image_url: first.chunk.image_url.clone(),
                bounding_boxes,
                relevance_score,
                title: None,
            }
        })
        .collect();

    citations.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));
    citations
}

/// Joins chunk-ordered members into one snippet: plain concatenation when
/// two members are chunk-index-adjacent, `" … "` when there's a gap,
/// trimming each member's content first so joins never carry stray
/// whitespace from chunk boundaries.
fn join_snippet_members(members: &[&SearchHit]) -> String {
    let mut snippet = String::new();
    for (i, member) in members.iter().enumerate() {
        let trimmed = member.chunk.content.trim();
        if i == 0 {
            snippet.push_str(trimmed);
            continue;
        }
        let prev_index = members[i - 1].chunk.chunk_index;
        let adjacent = member.chunk.chunk_index == prev_index + 1;
        snippet.push_str(if adjacent { " " } else { " … " });
        snippet.push_str(trimmed);
    }
    snippet
}

fn collect_evidence_images(citations: &[Citation]) -> Vec<EvidenceImage> {
    let mut seen = std::collections::HashSet::new();
    let mut images = Vec::new();
    for citation in citations {
        if images.len() >= MAX_EVIDENCE_IMAGES_HARD_CAP {
            break;
        }
        if let Some(url) = &citation.image_url {
            let key = (citation.document_id.clone(), citation.page_number);
            if seen.insert(key) {
                images.push(EvidenceImage {
                    document_id: citation.document_id.clone(),
                    page_number: citation.page_number,
                    image_url: url.clone(),
                });
            }
        }
    }
    images
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<DocumentChunk> {
    let embedding_blob: Vec<u8> = row.get(7)?;
    let bbox_json: Option<String> = row.get(9)?;
    let content_type_str: String = row.get(5)?;
    let bounding_boxes = bbox_json
        .as_deref()
        .and_then(|s| serde_json::from_str::<Vec<BoundingBox>>(s).ok())
        .unwrap_or_default();
    Ok(DocumentChunk {
        node_id: row.get(0)?,
        document_id: row.get(1)?,
        page_number: row.get(2)?,
        chunk_index: row.get(3)?,
        content: row.get(4)?,
        content_type: content_type_str.parse().unwrap_or(ContentType::Text),
        confidence: row.get(6)?,
        embedding: decode_embedding(&embedding_blob),
        image_url: row.get(8)?,
        bounding_boxes,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(node_id: &str, document_id: &str, page: u32, idx: u32, content: &str, embedding: Vec<f32>) -> DocumentChunk {
        let now = "2026-01-01T00:00:00Z".to_string();
        DocumentChunk {
            node_id: node_id.to_string(),
            document_id: document_id.to_string(),
            page_number: page,
            chunk_index: idx,
            content: content.to_string(),
            content_type: ContentType::Text,
            confidence: 1.0,
            embedding,
            image_url: None,
            bounding_boxes: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn insert_and_get_round_trips() {
        let store = KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        store.register_document("doc-1", Some("COLREGs"), None, 1).unwrap();
        let c = chunk("n1", "doc-1", 1, 0, "rule 5 lookout", vec![1.0, 0.0]);
        store.insert_chunks(&[c]).unwrap();
        let fetched = store.get_chunk("n1").unwrap();
        assert_eq!(fetched.content, "rule 5 lookout");
    }

    #[test]
    fn dense_search_ranks_by_cosine_similarity() {
        let store = KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        store.register_document("doc-1", None, None, 1).unwrap();
        store
            .insert_chunks(&[
                chunk("n1", "doc-1", 1, 0, "lookout", vec![1.0, 0.0]),
                chunk("n2", "doc-1", 1, 1, "unrelated", vec![0.0, 1.0]),
            ])
            .unwrap();
        let results = store.dense_search(&[1.0, 0.0], 5, &SearchFilters::default()).unwrap();
        assert_eq!(results[0].0.node_id, "n1");
    }

    #[test]
    fn lexical_search_matches_fts_terms() {
        let store = KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        store.register_document("doc-1", None, None, 1).unwrap();
        store
            .insert_chunks(&[chunk("n1", "doc-1", 1, 0, "maintain a proper lookout at all times", vec![0.1, 0.2])])
            .unwrap();
        let results = store.lexical_search("lookout", 5, &SearchFilters::default()).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn hybrid_search_groups_citations_by_page() {
        let store = KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        store.register_document("doc-1", None, None, 1).unwrap();
        store
            .insert_chunks(&[
                chunk("n1", "doc-1", 1, 0, "rule 5 lookout", vec![1.0, 0.0]),
                chunk("n2", "doc-1", 1, 1, "lookout by sight and hearing", vec![0.9, 0.1]),
            ])
            .unwrap();
        let result = store
            .hybrid_search("lookout", &[1.0, 0.0], 8, 32, 32, 0.6, &SearchFilters::default())
            .unwrap();
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].node_ids.len(), 2);
    }

    #[test]
    fn page_has_chunks_reflects_resume_state() {
        let store = KnowledgeStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        store.register_document("doc-1", None, None, 2).unwrap();
        assert!(!store.page_has_chunks("doc-1", 1).unwrap());
        store.insert_chunks(&[chunk("n1", "doc-1", 1, 0, "text", vec![0.1])]).unwrap();
        assert!(store.page_has_chunks("doc-1", 1).unwrap());
        assert!(!store.page_has_chunks("doc-1", 2).unwrap());
    }
}
