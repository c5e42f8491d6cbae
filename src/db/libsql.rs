use std::sync::Arc;

use async_trait::async_trait;
use libsql::{params, Builder, Connection};

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::models::HardFilter;

use super::traits::{CollectionStats, VectorMatch, VectorRecord, VectorStore};

/// libsql-backed vector store. Embeddings live in an `F32_BLOB` column and
/// similarity uses `vector_distance_cos`; the four hard-filterable metadata
/// fields get their own indexed columns so the store can apply the single
/// equality predicate itself.
pub struct LibSqlVectorStore {
    db: Arc<libsql::Database>,
    dimensions: usize,
}

impl LibSqlVectorStore {
    pub async fn new(config: &DatabaseConfig, dimensions: usize) -> Result<Self> {
        let db = if config.url.starts_with("libsql://") || config.url.starts_with("https://") {
            Builder::new_remote(
                config.url.clone(),
                config.auth_token.clone().unwrap_or_default(),
            )
            .build()
            .await?
        } else if config.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let store = Self {
            db: Arc::new(db),
            dimensions,
        };
        store.init_schema().await?;

        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            &format!(
                r#"
                CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    source_file TEXT NOT NULL,
                    page INTEGER,
                    position INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    token_count INTEGER,
                    destination TEXT,
                    travel_month TEXT,
                    category TEXT,
                    price_range TEXT,
                    metadata TEXT NOT NULL DEFAULT '{{}}',
                    created_at TEXT NOT NULL,
                    embedding F32_BLOB({})
                )
                "#,
                self.dimensions
            ),
            (),
        )
        .await?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_source_file ON chunks(source_file)",
            (),
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_destination ON chunks(destination)",
            (),
        )
        .await?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_travel_month ON chunks(travel_month)",
            (),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for LibSqlVectorStore {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let conn = self.connect()?;

        for record in records {
            let chunk = &record.chunk;
            let embedding_json = serde_json::to_string(&record.embedding)?;
            let metadata_json = serde_json::to_string(&chunk.metadata)?;

            conn.execute(
                r#"
                INSERT OR REPLACE INTO chunks (
                    id, source_file, page, position, content, token_count,
                    destination, travel_month, category, price_range,
                    metadata, created_at, embedding
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, vector32(?13))
                "#,
                params![
                    chunk.id.clone(),
                    chunk.source_file.clone(),
                    chunk.page,
                    chunk.position,
                    chunk.text.clone(),
                    chunk.token_count,
                    chunk.metadata.destination.clone(),
                    chunk.metadata.travel_month.map(|m| m.to_string()),
                    chunk.metadata.category.map(|c| c.to_string()),
                    chunk.metadata.price_range.map(|p| p.to_string()),
                    metadata_json,
                    chunk.created_at.to_rfc3339(),
                    embedding_json,
                ],
            )
            .await?;
        }

        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        filter: Option<&HardFilter>,
        top_k: u32,
    ) -> Result<Vec<VectorMatch>> {
        let conn = self.connect()?;
        let embedding_json = serde_json::to_string(embedding)?;

        // The filter column comes from a closed enum, never from user input.
        let (query, param_values) = match filter {
            Some(filter) => (
                format!(
                    r#"
                    SELECT id, source_file, page, content, metadata,
                           vector_distance_cos(embedding, vector32(?1)) as distance
                    FROM chunks
                    WHERE embedding IS NOT NULL
                      AND {} = ?3
                    ORDER BY distance ASC
                    LIMIT ?2
                    "#,
                    filter.field.column()
                ),
                vec![
                    libsql::Value::from(embedding_json),
                    libsql::Value::from(top_k),
                    libsql::Value::from(filter.value.clone()),
                ],
            ),
            None => (
                r#"
                SELECT id, source_file, page, content, metadata,
                       vector_distance_cos(embedding, vector32(?1)) as distance
                FROM chunks
                WHERE embedding IS NOT NULL
                ORDER BY distance ASC
                LIMIT ?2
                "#
                .to_string(),
                vec![
                    libsql::Value::from(embedding_json),
                    libsql::Value::from(top_k),
                ],
            ),
        };

        let mut rows = conn
            .query(&query, libsql::params_from_iter(param_values))
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let page: Option<i64> = row.get(2)?;
            let distance = row.get::<f64>(5)? as f32;

            results.push(VectorMatch {
                chunk_id: row.get(0)?,
                source_file: row.get(1)?,
                page: page.map(|p| p as u32),
                text: row.get(3)?,
                metadata: serde_json::from_str(&row.get::<String>(4)?).unwrap_or_default(),
                distance,
            });
        }

        Ok(results)
    }

    async fn delete_document(&self, source_file: &str) -> Result<u64> {
        let conn = self.connect()?;
        let deleted = conn
            .execute(
                "DELETE FROM chunks WHERE source_file = ?1",
                params![source_file],
            )
            .await?;
        Ok(deleted)
    }

    async fn stats(&self) -> Result<CollectionStats> {
        let conn = self.connect()?;

        let mut rows = conn.query("SELECT COUNT(*) FROM chunks", ()).await?;
        let total_chunks = match rows.next().await? {
            Some(row) => row.get::<i64>(0)? as u64,
            None => 0,
        };

        let mut rows = conn
            .query(
                "SELECT DISTINCT source_file FROM chunks ORDER BY source_file",
                (),
            )
            .await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(row.get::<String>(0)?);
        }

        Ok(CollectionStats {
            total_chunks,
            documents,
        })
    }
}
