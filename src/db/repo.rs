use crate::model::{Batch, BatchStatus, Link, LinkStatus};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    let mut options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {}", normalized))?
        .create_if_missing(true)
        .foreign_keys(true);
    let mut pool_options = SqlitePoolOptions::new();
    if in_memory {
        // Every connection to :memory: opens its own database.
        pool_options = pool_options.max_connections(1);
    } else {
        // Enable WAL and stricter durability.
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
    }
    let pool = pool_options.connect_with(options).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    let number: i64 = row.try_get("number")?;
    let status_str: String = row.try_get("status")?;
    let status = BatchStatus::parse_status(&status_str)
        .ok_or_else(|| anyhow!("batch {} has unknown status {}", number, status_str))?;
    Ok(Batch {
        number,
        link_count: row.try_get("link_count")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<Link> {
    let id: i64 = row.try_get("id")?;
    let status_str: String = row.try_get("status")?;
    let status = LinkStatus::parse_status(&status_str)
        .ok_or_else(|| anyhow!("link {} has unknown status {}", id, status_str))?;
    Ok(Link {
        id,
        url: row.try_get("url")?,
        status,
        batch_number: row.try_get("batch_number")?,
        checked_at: row.try_get::<Option<DateTime<Utc>>, _>("checked_at")?,
    })
}

#[instrument(skip_all)]
pub async fn create_batch(
    pool: &Pool,
    number: i64,
    link_count: i64,
    status: BatchStatus,
    created_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO batches (number, link_count, status, created_at) VALUES (?, ?, ?, ?)")
        .bind(number)
        .bind(link_count)
        .bind(status.as_str())
        .bind(created_at)
        .execute(pool)
        .await
        .with_context(|| format!("failed to create batch {}", number))?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn create_link(
    pool: &Pool,
    url: &str,
    status: LinkStatus,
    batch_number: i64,
    checked_at: Option<DateTime<Utc>>,
) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO links (url, status, batch_number, checked_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(url)
    .bind(status.as_str())
    .bind(batch_number)
    .bind(checked_at)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to create link for {}", url))?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn update_link_status(
    pool: &Pool,
    id: i64,
    status: LinkStatus,
    checked_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query("UPDATE links SET status = ?, checked_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(checked_at)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update link status")?;
    Ok(())
}

/// Move a batch out of `processing`. Terminal statuses are never overwritten.
#[instrument(skip_all)]
pub async fn update_batch_status(pool: &Pool, number: i64, status: BatchStatus) -> Result<()> {
    let res = sqlx::query("UPDATE batches SET status = ? WHERE number = ? AND status = ?")
        .bind(status.as_str())
        .bind(number)
        .bind(BatchStatus::Processing.as_str())
        .execute(pool)
        .await
        .context("failed to update batch status")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!(
            "batch {} not found or already finalized",
            number
        ));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn get_links_by_batch(pool: &Pool, number: i64) -> Result<Vec<Link>> {
    let rows = sqlx::query(
        "SELECT id, url, status, batch_number, checked_at FROM links WHERE batch_number = ? ORDER BY id",
    )
    .bind(number)
    .fetch_all(pool)
    .await?;
    rows.iter().map(link_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_batch(pool: &Pool, number: i64) -> Result<Option<Batch>> {
    let row = sqlx::query(
        "SELECT number, link_count, status, created_at FROM batches WHERE number = ?",
    )
    .bind(number)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(batch_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn get_all_batches(pool: &Pool) -> Result<Vec<Batch>> {
    let rows = sqlx::query(
        "SELECT number, link_count, status, created_at FROM batches ORDER BY number",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(batch_from_row).collect()
}

#[instrument(skip_all)]
pub async fn count_batches(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Highest stored batch number, 0 when no batch exists yet.
#[instrument(skip_all)]
pub async fn get_max_batch_number(pool: &Pool) -> Result<i64> {
    let max: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(number), 0) FROM batches")
        .fetch_one(pool)
        .await
        .context("failed to get max batch number")?;
    Ok(max)
}

/// Bound parameters per `IN (...)` query, well under SQLite's variable limit.
const IN_CHUNK: usize = 500;

/// Read the requested batches and all of their links in one transaction.
/// Unknown and repeated numbers are skipped; batches come back in number order
/// and links in (batch, id) order.
#[instrument(skip_all)]
pub async fn get_batches_and_links(pool: &Pool, numbers: &[i64]) -> Result<(Vec<Batch>, Vec<Link>)> {
    if numbers.is_empty() {
        return Err(anyhow!("no batch numbers provided"));
    }
    let mut numbers = numbers.to_vec();
    numbers.sort_unstable();
    numbers.dedup();

    let mut tx = pool.begin().await?;
    let mut batch_rows = Vec::new();
    let mut link_rows = Vec::new();

    // Chunks are ascending, so concatenated results stay ordered.
    for chunk in numbers.chunks(IN_CHUNK) {
        let mut batch_query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT number, link_count, status, created_at FROM batches WHERE number IN (",
        );
        let mut separated = batch_query.separated(", ");
        for number in chunk {
            separated.push_bind(*number);
        }
        separated.push_unseparated(") ORDER BY number");
        batch_rows.extend(
            batch_query
                .build()
                .fetch_all(&mut *tx)
                .await
                .context("failed to query batches")?,
        );

        let mut link_query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, url, status, batch_number, checked_at FROM links WHERE batch_number IN (",
        );
        let mut separated = link_query.separated(", ");
        for number in chunk {
            separated.push_bind(*number);
        }
        separated.push_unseparated(") ORDER BY batch_number, id");
        link_rows.extend(
            link_query
                .build()
                .fetch_all(&mut *tx)
                .await
                .context("failed to query links")?,
        );
    }

    tx.commit().await?;

    let batches = batch_rows
        .iter()
        .map(batch_from_row)
        .collect::<Result<Vec<_>>>()?;
    let links = link_rows
        .iter()
        .map(link_from_row)
        .collect::<Result<Vec<_>>>()?;
    Ok((batches, links))
}
