//! Full-text chunk index
//!
//! FTS5-backed search over fixed-size text chunks. The index is a derived
//! projection: it is rebuilt wholesale from version content after every
//! change and is never a source of truth.

use serde::Serialize;
use sqlx::SqlitePool;

use super::ViewKind;
use crate::error::Result;

/// Window size for index chunks, in characters.
pub const CHUNK_SIZE: usize = 1000;

/// Search hit: which document/kind matched, with a highlighted snippet.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SearchHit {
    pub doc_id: String,
    pub kind: String,
    pub snippet: String,
}

/// Split text into contiguous `CHUNK_SIZE`-character windows.
///
/// No overlap; the last chunk may be shorter. The concatenation of the
/// chunks equals the trimmed input exactly.
pub fn chunk_text(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    chars
        .chunks(CHUNK_SIZE)
        .map(|window| window.iter().collect())
        .collect()
}

/// Chunk index repository
pub struct ChunkIndex<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChunkIndex<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop and re-insert all chunks for (document, kind) from `text`.
    pub async fn rebuild(&self, doc_id: &str, kind: ViewKind, text: &str) -> Result<usize> {
        self.clear(doc_id, kind).await?;

        let chunks = chunk_text(text);
        for (seq, content) in chunks.iter().enumerate() {
            sqlx::query("INSERT INTO chunks_fts (content, doc_id, kind, seq) VALUES (?, ?, ?, ?)")
                .bind(content)
                .bind(doc_id)
                .bind(kind.as_str())
                .bind(seq as i64)
                .execute(self.pool)
                .await?;
        }

        tracing::info!(doc_id = %doc_id, kind = %kind.as_str(), chunks = chunks.len(), "Chunk index rebuilt");
        Ok(chunks.len())
    }

    pub async fn clear(&self, doc_id: &str, kind: ViewKind) -> Result<()> {
        sqlx::query("DELETE FROM chunks_fts WHERE doc_id = ? AND kind = ?")
            .bind(doc_id)
            .bind(kind.as_str())
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// Indexed chunks for (document, kind), in sequence order.
    pub async fn chunks(&self, doc_id: &str, kind: ViewKind) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT content FROM chunks_fts WHERE doc_id = ? AND kind = ? ORDER BY CAST(seq AS INTEGER)",
        )
        .bind(doc_id)
        .bind(kind.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(content,)| content).collect())
    }

    /// Keyword search across the caller-visible document set.
    pub async fn search(
        &self,
        query: &str,
        visible_doc_ids: &[String],
        limit: i64,
    ) -> Result<Vec<SearchHit>> {
        if visible_doc_ids.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<&str> = visible_doc_ids.iter().map(|_| "?").collect();
        let sql = format!(
            r#"
            SELECT doc_id, kind, snippet(chunks_fts, 0, '[', ']', '…', 10) AS snippet
            FROM chunks_fts
            WHERE chunks_fts MATCH ? AND doc_id IN ({})
            LIMIT ?
            "#,
            placeholders.join(",")
        );

        let mut sql_query = sqlx::query_as::<_, SearchHit>(&sql).bind(sanitize_match(query));
        for doc_id in visible_doc_ids {
            sql_query = sql_query.bind(doc_id);
        }
        sql_query = sql_query.bind(limit);

        let hits = sql_query.fetch_all(self.pool).await?;
        Ok(hits)
    }
}

/// Sanitize a query string for FTS5.
///
/// FTS5 has special syntax characters that need escaping or removal to
/// prevent query syntax errors.
fn sanitize_match(query: &str) -> String {
    let mut result = String::with_capacity(query.len());

    for ch in query.chars() {
        match ch {
            '"' => result.push_str("\"\""),
            '*' | '(' | ')' | ':' | '^' | '-' | '+' => {}
            _ => result.push(ch),
        }
    }

    let trimmed = result.trim();
    if trimmed.contains(' ') {
        format!("\"{}\"", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[test]
    fn chunking_is_deterministic() {
        let text = "a".repeat(2500);
        let chunks = chunk_text(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 500);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunking_exact_multiple() {
        let chunks = chunk_text(&"x".repeat(2000));
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 1000));
    }

    #[test]
    fn chunking_counts_characters_not_bytes() {
        let text = "я".repeat(1001);
        let chunks = chunk_text(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(chunks[1].chars().count(), 1);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunking_empty_and_whitespace() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   \n\t ").is_empty());
    }

    #[test]
    fn sanitize_match_quotes_phrases() {
        assert_eq!(sanitize_match("simple"), "simple");
        assert_eq!(sanitize_match("two words"), "\"two words\"");
        assert_eq!(sanitize_match("test*"), "test");
        assert_eq!(sanitize_match("test:value"), "testvalue");
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_chunks() {
        let pool = memory_pool().await;
        let index = ChunkIndex::new(&pool);

        index
            .rebuild("doc-1", ViewKind::Original, &"a".repeat(1500))
            .await
            .unwrap();
        assert_eq!(index.chunks("doc-1", ViewKind::Original).await.unwrap().len(), 2);

        index
            .rebuild("doc-1", ViewKind::Original, "short")
            .await
            .unwrap();
        let chunks = index.chunks("doc-1", ViewKind::Original).await.unwrap();
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[tokio::test]
    async fn search_filters_to_visible_documents() {
        let pool = memory_pool().await;
        let index = ChunkIndex::new(&pool);

        index
            .rebuild("doc-1", ViewKind::Original, "the quick brown fox")
            .await
            .unwrap();
        index
            .rebuild("doc-2", ViewKind::Saved, "the quick brown fox")
            .await
            .unwrap();

        let visible = vec!["doc-2".to_string()];
        let hits = index.search("quick", &visible, 30).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "doc-2");
        assert_eq!(hits[0].kind, "saved");
        assert!(hits[0].snippet.contains("quick"));
    }
}
