//! SQLite document store for ArcIndex.
//!
//! Persists every index, its alias, and its documents to a single SQLite
//! file. Document bodies are stored as JSON text and filtered with
//! `json_extract`, so the record kinds need no per-kind schema.
//!
//! # Usage
//! ```rust,no_run
//! use arcindex_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./arcindex.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::debug;

use arcindex_core::document::{Document, RecordKind};
use arcindex_core::error::IndexerError;
use arcindex_core::store::{DocumentStore, DocumentStream, Query, StoredDocument};

/// Rows fetched per scroll page when the query carries no size hint.
const DEFAULT_PAGE: usize = 1000;

/// Row counts of one physical index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub index: String,
    pub kind: String,
    pub alias: Option<String>,
    pub documents: u64,
}

enum Bind {
    Text(String),
    Int(i64),
}

/// `WHERE` fragment plus its bind values for a [`Query`].
struct Filter {
    sql: String,
    binds: Vec<Bind>,
}

impl Filter {
    fn new(index: &str, query: &Query) -> Self {
        let mut sql = String::from("index_name = ?");
        let mut binds = vec![Bind::Text(index.to_string())];
        if let Some(range) = &query.range {
            sql.push_str(" AND json_extract(body, ?) BETWEEN ? AND ?");
            binds.push(Bind::Text(json_path(&range.field)));
            binds.push(Bind::Int(range.min as i64));
            binds.push(Bind::Int(range.max.min(i64::MAX as u64) as i64));
        }
        if let Some(term) = &query.term {
            if term.field == "_id" {
                sql.push_str(" AND id = ?");
            } else {
                sql.push_str(" AND json_extract(body, ?) = ?");
                binds.push(Bind::Text(json_path(&term.field)));
            }
            binds.push(Bind::Text(term.value.clone()));
        }
        Self { sql, binds }
    }

    fn order_by(&mut self, query: &Query) {
        match &query.sort {
            Some(sort) if sort.field == "_id" => {
                self.sql.push_str(if sort.ascending {
                    " ORDER BY id ASC"
                } else {
                    " ORDER BY id DESC"
                });
            }
            Some(sort) => {
                self.sql.push_str(if sort.ascending {
                    " ORDER BY json_extract(body, ?) ASC, id ASC"
                } else {
                    " ORDER BY json_extract(body, ?) DESC, id ASC"
                });
                self.binds.push(Bind::Text(json_path(&sort.field)));
            }
            None => self.sql.push_str(" ORDER BY id ASC"),
        }
    }

    fn bind<'q>(
        &self,
        mut q: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
        for b in &self.binds {
            q = match b {
                Bind::Text(s) => q.bind(s.clone()),
                Bind::Int(i) => q.bind(*i),
            };
        }
        q
    }
}

fn json_path(field: &str) -> String {
    format!("$.{field}")
}

fn storage_err(e: sqlx::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// SQLite-backed document store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./arcindex.db"`) or a full
    /// SQLite URL (`"sqlite:./arcindex.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Every pooled connection would get its own empty database, so the pool
    /// is pinned to a single connection.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS indices (
                index_name TEXT PRIMARY KEY,
                kind       TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS aliases (
                alias      TEXT PRIMARY KEY,
                index_name TEXT NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                index_name TEXT NOT NULL,
                id         TEXT NOT NULL,
                body       TEXT NOT NULL,
                PRIMARY KEY (index_name, id)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Follow an alias to its index. Names that are not aliases pass through.
    async fn resolve(&self, name: &str) -> Result<String, IndexerError> {
        Ok(self
            .existing_index(name)
            .await?
            .unwrap_or_else(|| name.to_string()))
    }

    async fn fetch(
        &self,
        index: &str,
        query: &Query,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<StoredDocument>, IndexerError> {
        let index = self.resolve(index).await?;
        let mut filter = Filter::new(&index, query);
        filter.order_by(query);
        let sql = format!(
            "SELECT id, body FROM documents WHERE {} LIMIT {limit} OFFSET {offset}",
            filter.sql
        );
        let rows = filter
            .bind(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get("body");
            docs.push(StoredDocument {
                id: row.get("id"),
                body: serde_json::from_str(&body)?,
            });
        }
        Ok(docs)
    }

    /// Every physical index with its kind, alias, and document count.
    pub async fn stats(&self) -> Result<Vec<IndexStats>, IndexerError> {
        let rows = sqlx::query(
            "SELECT i.index_name, i.kind, a.alias,
                    (SELECT COUNT(*) FROM documents d WHERE d.index_name = i.index_name) AS cnt
             FROM indices i LEFT JOIN aliases a ON a.index_name = i.index_name
             ORDER BY i.index_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(rows
            .into_iter()
            .map(|r| IndexStats {
                index: r.get("index_name"),
                kind: r.get("kind"),
                alias: r.get("alias"),
                documents: r.get::<i64, _>("cnt") as u64,
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn existing_index(&self, alias: &str) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query("SELECT index_name FROM aliases WHERE alias = ?")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.map(|r| r.get::<String, _>("index_name")))
    }

    async fn create_index(&self, index: &str, kind: RecordKind) -> Result<(), IndexerError> {
        sqlx::query("INSERT OR IGNORE INTO indices (index_name, kind) VALUES (?, ?)")
            .bind(index)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        debug!(index, kind = %kind, "index created");
        Ok(())
    }

    async fn update_alias(&self, alias: &str, index: &str) -> Result<(), IndexerError> {
        let exists = sqlx::query("SELECT 1 FROM indices WHERE index_name = ?")
            .bind(index)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        if exists.is_none() {
            return Err(IndexerError::Storage(format!(
                "cannot alias '{alias}' to missing index '{index}'"
            )));
        }
        sqlx::query("INSERT OR REPLACE INTO aliases (alias, index_name) VALUES (?, ?)")
            .bind(alias)
            .bind(index)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        debug!(alias, index, "alias updated");
        Ok(())
    }

    async fn insert(&self, index: &str, doc: &Document) -> Result<(), IndexerError> {
        let index = self.resolve(index).await?;
        let body = serde_json::to_string(&doc.body()?)?;
        sqlx::query("INSERT OR REPLACE INTO documents (index_name, id, body) VALUES (?, ?, ?)")
            .bind(&index)
            .bind(doc.id())
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn update(&self, index: &str, id: &str, partial: Value) -> Result<(), IndexerError> {
        let index = self.resolve(index).await?;
        let row = sqlx::query("SELECT body FROM documents WHERE index_name = ? AND id = ?")
            .bind(&index)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| {
                IndexerError::Storage(format!("document '{id}' not found in '{index}'"))
            })?;

        let body: String = row.get("body");
        let mut doc = StoredDocument {
            id: id.to_string(),
            body: serde_json::from_str(&body)?,
        };
        doc.merge(&partial);

        sqlx::query("UPDATE documents SET body = ? WHERE index_name = ? AND id = ?")
            .bind(serde_json::to_string(&doc.body)?)
            .bind(&index)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn delete(&self, index: &str, query: &Query) -> Result<u64, IndexerError> {
        let index = self.resolve(index).await?;
        let filter = Filter::new(&index, query);
        let sql = format!("DELETE FROM documents WHERE {}", filter.sql);
        let result = filter
            .bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        debug!(index = %index, deleted = result.rows_affected(), "documents deleted");
        Ok(result.rows_affected())
    }

    async fn count(&self, index: &str, query: &Query) -> Result<u64, IndexerError> {
        let index = self.resolve(index).await?;
        let filter = Filter::new(&index, query);
        let sql = format!("SELECT COUNT(*) AS cnt FROM documents WHERE {}", filter.sql);
        let row = filter
            .bind(sqlx::query(&sql))
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    async fn select_one(
        &self,
        index: &str,
        query: &Query,
    ) -> Result<Option<StoredDocument>, IndexerError> {
        Ok(self.fetch(index, query, 1, 0).await?.into_iter().next())
    }

    fn scroll<'a>(&'a self, index: &'a str, query: Query) -> DocumentStream<'a> {
        let page = query.size.unwrap_or(DEFAULT_PAGE).max(1);
        futures::stream::unfold(Some(0usize), move |offset| {
            let query = query.clone();
            async move {
                let offset = offset?;
                match self.fetch(index, &query, page, offset).await {
                    Ok(docs) => {
                        let next = (docs.len() == page).then_some(offset + page);
                        Some((docs.into_iter().map(Ok).collect::<Vec<_>>(), next))
                    }
                    Err(e) => Some((vec![Err(e)], None)),
                }
            }
        })
        .flat_map(futures::stream::iter)
        .boxed()
    }

    async fn bulk_commit(&self, index: &str, docs: &[Document]) -> Result<(), IndexerError> {
        let index = self.resolve(index).await?;
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for doc in docs {
            let body = serde_json::to_string(&doc.body()?)?;
            sqlx::query(
                "INSERT OR REPLACE INTO documents (index_name, id, body) VALUES (?, ?, ?)",
            )
            .bind(&index)
            .bind(doc.id())
            .bind(&body)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        debug!(index = %index, count = docs.len(), "bulk committed");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
