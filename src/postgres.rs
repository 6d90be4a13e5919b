// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! PostgreSQL row source.
//!
//! Each extraction pass uses its own connection and a server-side cursor, so
//! memory stays bounded by `batch_size` no matter how large the backlog is.
//!
//! # Statement Flow
//!
//! ```text
//! connect (connect_timeout)
//!   SET TIME ZONE 'UTC'
//!   BEGIN READ ONLY
//!   DECLARE replicator_rows NO SCROLL CURSOR FOR
//!     SELECT to_jsonb(q) AS doc FROM (<query>) q
//!     WHERE q."updated_at" > $1
//!     ORDER BY q."updated_at", q."id"
//!   FETCH FORWARD <batch_size> FROM replicator_rows   ← repeated
//!   CLOSE replicator_rows; COMMIT                     ← on first empty fetch
//! ```
//!
//! The configured query is wrapped as a subquery. It may reference the
//! watermark as `$1` itself (to push the filter down into joins); the outer
//! filter and ordering are applied either way, which is what makes the
//! watermark safe to advance to the last row of a batch.
//!
//! The session time zone is pinned to UTC so `timestamptz` columns render with
//! a `+00:00` offset inside the JSON rows.

use crate::config::ReplicationConfig;
use crate::document::SourceRow;
use crate::error::{ReplicationError, Result};
use crate::source::{BoxFuture, RowCursor, RowSource};
use crate::watermark::Watermark;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Row};
use std::time::Duration;
use tracing::{debug, info};

const CURSOR_NAME: &str = "replicator_rows";

/// Reads rows from PostgreSQL through a server-side cursor.
#[derive(Clone)]
pub struct PgSource {
    options: PgConnectOptions,
    connect_timeout: Duration,
    declare_sql: String,
}

impl std::fmt::Debug for PgSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSource")
            .field("connect_timeout", &self.connect_timeout)
            .field("declare_sql", &self.declare_sql)
            .finish_non_exhaustive()
    }
}

impl PgSource {
    /// Create a source running `query` against the database at `options`.
    pub fn new(
        options: PgConnectOptions,
        query: &str,
        id_field: &str,
        watermark_field: &str,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            options,
            connect_timeout,
            declare_sql: declare_cursor_sql(query, id_field, watermark_field),
        }
    }

    /// Build a source from the `source` and `settings` config sections.
    pub fn from_config(config: &ReplicationConfig) -> Result<Self> {
        let source = &config.source;
        let options = PgConnectOptions::new()
            .host(&source.host)
            .port(source.port)
            .database(&source.dbname)
            .username(&source.user)
            .password(&source.password)
            .application_name("index-replicator");

        let query = config.load_query()?;
        info!(
            host = %source.host,
            port = source.port,
            dbname = %source.dbname,
            "Configured PostgreSQL source"
        );

        Ok(Self::new(
            options,
            &query,
            &config.settings.id_field,
            &config.settings.watermark_field,
            source.connect_timeout_duration(),
        ))
    }

    /// The cursor declaration sent for each pass.
    pub fn declare_sql(&self) -> &str {
        &self.declare_sql
    }

    async fn connect(&self) -> Result<PgConnection> {
        match tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(ReplicationError::sql("connect", e)),
            Err(_) => Err(ReplicationError::sql_msg(
                "connect",
                format!("timed out after {:?}", self.connect_timeout),
            )),
        }
    }

    async fn open_cursor(&self, since: Watermark, batch_size: usize) -> Result<PgRowCursor> {
        let mut conn = self.connect().await?;

        sqlx::query("SET TIME ZONE 'UTC'")
            .execute(&mut conn)
            .await
            .map_err(|e| ReplicationError::sql("set_time_zone", e))?;

        sqlx::query("BEGIN READ ONLY")
            .execute(&mut conn)
            .await
            .map_err(|e| ReplicationError::sql("begin", e))?;

        sqlx::query(&self.declare_sql)
            .bind(since.as_datetime())
            .execute(&mut conn)
            .await
            .map_err(|e| ReplicationError::sql("declare_cursor", e))?;

        debug!(since = %since, batch_size, "Declared source cursor");

        Ok(PgRowCursor {
            conn: Some(conn),
            fetch_sql: format!("FETCH FORWARD {} FROM {CURSOR_NAME}", batch_size.max(1)),
        })
    }
}

impl RowSource for PgSource {
    fn open(&self, since: Watermark, batch_size: usize) -> BoxFuture<'_, Box<dyn RowCursor>> {
        Box::pin(async move {
            let cursor = self.open_cursor(since, batch_size).await?;
            Ok(Box::new(cursor) as Box<dyn RowCursor>)
        })
    }
}

/// An open server-side cursor. Dropping it before exhaustion closes the
/// connection, which rolls the read-only transaction back.
pub struct PgRowCursor {
    conn: Option<PgConnection>,
    fetch_sql: String,
}

impl PgRowCursor {
    async fn fetch_rows(&mut self) -> Result<Vec<SourceRow>> {
        let Some(conn) = self.conn.as_mut() else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(&self.fetch_sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| ReplicationError::sql("fetch", e))?;

        if rows.is_empty() {
            self.finish().await?;
            return Ok(Vec::new());
        }

        rows.into_iter()
            .map(|row| {
                let value: serde_json::Value = row
                    .try_get("doc")
                    .map_err(|e| ReplicationError::sql("decode_row", e))?;
                SourceRow::from_json(value)
            })
            .collect()
    }

    async fn finish(&mut self) -> Result<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        sqlx::query(&format!("CLOSE {CURSOR_NAME}"))
            .execute(&mut conn)
            .await
            .map_err(|e| ReplicationError::sql("close_cursor", e))?;
        sqlx::query("COMMIT")
            .execute(&mut conn)
            .await
            .map_err(|e| ReplicationError::sql("commit", e))?;
        conn.close()
            .await
            .map_err(|e| ReplicationError::sql("disconnect", e))?;

        debug!("Source cursor exhausted, transaction committed");
        Ok(())
    }
}

impl RowCursor for PgRowCursor {
    fn fetch(&mut self) -> BoxFuture<'_, Vec<SourceRow>> {
        Box::pin(self.fetch_rows())
    }
}

/// Quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn declare_cursor_sql(query: &str, id_field: &str, watermark_field: &str) -> String {
    let ts = quote_ident(watermark_field);
    let id = quote_ident(id_field);
    format!(
        "DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR \
         SELECT to_jsonb(q) AS doc FROM ({query}) q \
         WHERE q.{ts} > $1 \
         ORDER BY q.{ts}, q.{id}"
    )
}
