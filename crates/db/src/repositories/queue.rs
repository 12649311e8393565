use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::Row;

use requesty_core::domain::queue::{Queue, QueueId};
use requesty_core::ports::{QueueRepository, StorageError};

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

const QUEUE_COLUMNS: &str = "SELECT id, name, description, channel_id, created_by_id,
        admin_ids, member_ids, created_at, updated_at
     FROM queues";

/// Admin and member sets are stored as JSON arrays in a single row.
pub struct SqlQueueRepository {
    pool: DbPool,
}

impl SqlQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, queue: &Queue) -> Result<(), RepositoryError> {
        let admin_ids = encode_set(&queue.admin_ids)?;
        let member_ids = encode_set(&queue.member_ids)?;

        sqlx::query(
            "INSERT INTO queues (id, name, description, channel_id, created_by_id,
                                 admin_ids, member_ids, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 channel_id = excluded.channel_id,
                 admin_ids = excluded.admin_ids,
                 member_ids = excluded.member_ids,
                 updated_at = excluded.updated_at",
        )
        .bind(&queue.id.0)
        .bind(&queue.name)
        .bind(&queue.description)
        .bind(queue.channel_id.as_deref())
        .bind(&queue.created_by_id)
        .bind(admin_ids)
        .bind(member_ids)
        .bind(queue.created_at.to_rfc3339())
        .bind(queue.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_one(&self, id: &QueueId) -> Result<Option<Queue>, RepositoryError> {
        let row = sqlx::query(&format!("{QUEUE_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_queue).transpose()
    }

    async fn fetch_where(&self, column: &str, value: &str) -> Result<Vec<Queue>, RepositoryError> {
        let rows = sqlx::query(&format!("{QUEUE_COLUMNS} WHERE {column} = ? ORDER BY name ASC"))
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_queue).collect()
    }

    async fn fetch_all(&self) -> Result<Vec<Queue>, RepositoryError> {
        let rows = sqlx::query(&format!("{QUEUE_COLUMNS} ORDER BY name ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_queue).collect()
    }
}

fn encode_set(ids: &BTreeSet<String>) -> Result<String, RepositoryError> {
    serde_json::to_string(ids).map_err(|error| RepositoryError::Encode(error.to_string()))
}

fn decode_set(column: &str, raw: &str) -> Result<BTreeSet<String>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("{column} is not a JSON array: {error}")))
}

fn row_to_queue(row: &sqlx::sqlite::SqliteRow) -> Result<Queue, RepositoryError> {
    let admin_ids: String = row.try_get("admin_ids").map_err(decode_err)?;
    let member_ids: String = row.try_get("member_ids").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Queue {
        id: QueueId(row.try_get("id").map_err(decode_err)?),
        name: row.try_get("name").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        channel_id: row.try_get("channel_id").map_err(decode_err)?,
        created_by_id: row.try_get("created_by_id").map_err(decode_err)?,
        admin_ids: decode_set("admin_ids", &admin_ids)?,
        member_ids: decode_set("member_ids", &member_ids)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait]
impl QueueRepository for SqlQueueRepository {
    async fn save(&self, queue: &Queue) -> Result<(), StorageError> {
        Ok(self.upsert(queue).await?)
    }

    async fn get_by_id(&self, id: &QueueId) -> Result<Option<Queue>, StorageError> {
        Ok(self.fetch_one(id).await?)
    }

    async fn find_by_channel_id(&self, channel_id: &str) -> Result<Vec<Queue>, StorageError> {
        Ok(self.fetch_where("channel_id", channel_id).await?)
    }

    async fn find_all(&self) -> Result<Vec<Queue>, StorageError> {
        Ok(self.fetch_all().await?)
    }
}
