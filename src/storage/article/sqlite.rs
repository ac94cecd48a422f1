//! `SQLite`-backed article store.

use super::validate_image_path;
use crate::models::{Article, NewArticle, RecordId};
use crate::storage::context::OpContext;
use crate::storage::document::{ArticleDocument, expiration_key};
use crate::storage::outcome::UpdateOutcome;
use crate::storage::sqlite::{
    SqliteHandle, lock_connection, open_connection, run_operation, sql_err,
};
use crate::storage::traits::{ArticleStore, ExpiringCollection};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;
use tracing::instrument;

const BACKEND: &str = "sqlite";

const SELECT_TITLES_WITH_IMAGES: &str = "SELECT a.title FROM articles a
     WHERE EXISTS (SELECT 1 FROM article_images i WHERE i.article_id = a.id)
     ORDER BY a.seq";

const SELECT_TITLES_WITHOUT_IMAGES: &str = "SELECT a.title FROM articles a
     WHERE NOT EXISTS (SELECT 1 FROM article_images i WHERE i.article_id = a.id)
     ORDER BY a.seq";

/// `SQLite`-backed [`ArticleStore`].
///
/// # Schema
///
/// - `articles`: `seq`, `id`, `title`, `expiration_date` (Unix nanoseconds),
///   `description`
/// - `article_images`: `article_id`, `path`, `position`, cascading on delete
/// - `idx_articles_expiration_date`: the time-to-live index
pub struct SqliteArticleStore {
    conn: SqliteHandle,
    db_path: Option<PathBuf>,
}

impl SqliteArticleStore {
    /// Opens (or creates) a file-backed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema and
    /// expiration index cannot be created.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(Some(&db_path))?;
        Self::build(conn, Some(db_path))
    }

    /// Creates an ephemeral in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::build(open_connection(None)?, None)
    }

    /// Creates a store on an existing connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn from_handle(conn: SqliteHandle) -> Result<Self> {
        Self::build(conn, None)
    }

    /// Returns the database path (None for in-memory or shared handles).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn build(conn: SqliteHandle, db_path: Option<PathBuf>) -> Result<Self> {
        let store = Self { conn, db_path };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = lock_connection(&self.conn);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS articles (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                expiration_date INTEGER NOT NULL,
                description TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS article_images (
                article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                path TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (article_id, path)
            );",
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_article_tables".to_string(),
            cause: e.to_string(),
        })?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_articles_expiration_date ON articles(expiration_date)",
            [],
        )
        .map_err(|e| Error::OperationFailed {
            operation: "create_expiration_index".to_string(),
            cause: e.to_string(),
        })?;

        tracing::debug!(db_path = ?self.db_path, "Article schema ready");
        Ok(())
    }
}

fn query_titles(conn: &Connection, sql: &str, operation: &'static str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql).map_err(sql_err(operation))?;
    let titles = stmt
        .query_map([], |row| row.get(0))
        .map_err(sql_err(operation))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(sql_err(operation))?;
    Ok(titles)
}

fn load_images(conn: &Connection, article_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT path FROM article_images WHERE article_id = ?1 ORDER BY position")
        .map_err(sql_err("find_article_by_id"))?;
    let paths = stmt
        .query_map(params![article_id], |row| row.get(0))
        .map_err(sql_err("find_article_by_id"))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(sql_err("find_article_by_id"))?;
    Ok(paths)
}

impl ExpiringCollection for SqliteArticleStore {
    fn collection_name(&self) -> &'static str {
        "articles"
    }

    #[instrument(skip(self), fields(operation = "purge_expired", backend = "sqlite"))]
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = expiration_key(&now)?;
        run_operation(
            &self.conn,
            &OpContext::background(),
            BACKEND,
            "purge_expired_articles",
            |conn| {
                conn.execute(
                    "DELETE FROM articles WHERE expiration_date <= ?1",
                    params![cutoff],
                )
                .map_err(sql_err("purge_expired_articles"))
            },
        )
    }
}

impl ArticleStore for SqliteArticleStore {
    #[instrument(skip(self, ctx, article), fields(operation = "insert_one", backend = "sqlite"))]
    fn insert_one(&self, ctx: &OpContext, article: &NewArticle) -> Result<RecordId> {
        article.validate()?;
        let id = RecordId::generate();
        let doc = ArticleDocument::new(id, article)?;

        run_operation(&self.conn, ctx, BACKEND, "insert_article", |conn| {
            conn.execute(
                "INSERT INTO articles (id, title, expiration_date, description)
                 VALUES (?1, ?2, ?3, ?4)",
                params![doc.id, doc.title, doc.expiration_nanos, doc.description],
            )
            .map_err(sql_err("insert_article"))
        })?;

        tracing::debug!(record.id = %id, "Inserted article");
        Ok(id)
    }

    #[instrument(skip(self, ctx), fields(operation = "find_one_by_id", backend = "sqlite", record.id = %id))]
    fn find_one_by_id(&self, ctx: &OpContext, id: &RecordId) -> Result<Option<Article>> {
        let key = id.to_string();
        let doc = run_operation(&self.conn, ctx, BACKEND, "find_article_by_id", |conn| {
            let found = conn
                .query_row(
                    "SELECT id, title, expiration_date, description FROM articles WHERE id = ?1",
                    params![key],
                    |row| {
                        Ok(ArticleDocument {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            expiration_nanos: row.get(2)?,
                            description: row.get(3)?,
                            image_paths: Vec::new(),
                        })
                    },
                )
                .optional()
                .map_err(sql_err("find_article_by_id"))?;
            match found {
                Some(mut doc) => {
                    doc.image_paths = load_images(conn, &doc.id)?;
                    Ok(Some(doc))
                },
                None => Ok(None),
            }
        })?;
        doc.map(Article::try_from).transpose()
    }

    #[instrument(skip(self, ctx), fields(operation = "find_all_titles", backend = "sqlite"))]
    fn find_all_titles(&self, ctx: &OpContext) -> Result<Vec<String>> {
        run_operation(&self.conn, ctx, BACKEND, "find_all_titles", |conn| {
            query_titles(
                conn,
                "SELECT title FROM articles ORDER BY seq",
                "find_all_titles",
            )
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "find_titles_by_has_image", backend = "sqlite"))]
    fn find_titles_by_has_image(&self, ctx: &OpContext, with_image: bool) -> Result<Vec<String>> {
        let sql = if with_image {
            SELECT_TITLES_WITH_IMAGES
        } else {
            SELECT_TITLES_WITHOUT_IMAGES
        };
        run_operation(&self.conn, ctx, BACKEND, "find_titles_by_has_image", |conn| {
            query_titles(conn, sql, "find_titles_by_has_image")
        })
    }

    #[instrument(skip(self, ctx), fields(operation = "append_image", backend = "sqlite", record.id = %id))]
    fn append_image(&self, ctx: &OpContext, id: &RecordId, path: &str) -> Result<UpdateOutcome> {
        validate_image_path(path)?;
        let key = id.to_string();
        run_operation(&self.conn, ctx, BACKEND, "append_image", |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO article_images (article_id, path, position)
                     SELECT a.id, ?2,
                            COALESCE((SELECT MAX(position) FROM article_images WHERE article_id = ?1), -1) + 1
                     FROM articles a WHERE a.id = ?1",
                    params![key, path],
                )
                .map_err(sql_err("append_image"))?;
            if inserted > 0 {
                return Ok(UpdateOutcome::single(true, true));
            }
            let matched: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM articles WHERE id = ?1)",
                    params![key],
                    |row| row.get(0),
                )
                .map_err(sql_err("append_image"))?;
            Ok(UpdateOutcome::single(matched, false))
        })
    }
}
