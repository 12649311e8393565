use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite};

use requesty_core::domain::recipient::{RecipientKind, RequestRecipient};
use requesty_core::domain::request::{Request, RequestId, RequestStatus};
use requesty_core::ports::{RequestRepository, StorageError};

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "SELECT id, title, description, created_by_id, recipient_id,
        recipient_type, status, accepted_by_id, rejection_reason, created_at, updated_at, version
     FROM requests";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Inserts, or updates only when the stored version is the one this copy
    /// was loaded at. A skipped update reports zero affected rows.
    async fn upsert(&self, request: &Request) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO requests (id, title, description, created_by_id, recipient_id,
                                   recipient_type, status, accepted_by_id, rejection_reason,
                                   created_at, updated_at, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 status = excluded.status,
                 accepted_by_id = excluded.accepted_by_id,
                 rejection_reason = excluded.rejection_reason,
                 updated_at = excluded.updated_at,
                 version = excluded.version
             WHERE requests.version = excluded.version - 1",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.created_by_id)
        .bind(&request.recipient.id)
        .bind(request.recipient.kind.as_str())
        .bind(request.status.as_str())
        .bind(request.accepted_by_id.as_deref())
        .bind(request.rejection_reason.as_deref())
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .bind(i64::from(request.version))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn fetch_one(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("{REQUEST_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_request).transpose()
    }

    async fn fetch_where(&self, column: &str, value: &str) -> Result<Vec<Request>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{REQUEST_COLUMNS} WHERE {column} = ? ORDER BY created_at DESC"
        ))
        .bind(value)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_request).collect()
    }

    async fn fetch_for_recipient(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
        statuses: &[RequestStatus],
    ) -> Result<Vec<Request>, RepositoryError> {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(REQUEST_COLUMNS);
        builder.push(" WHERE recipient_id = ");
        builder.push_bind(recipient_id.to_owned());
        builder.push(" AND recipient_type = ");
        builder.push_bind(kind.as_str());

        if !statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            builder.push(")");
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect()
    }
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let recipient_id: String = row.try_get("recipient_id").map_err(decode_err)?;
    let recipient_type: String = row.try_get("recipient_type").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;
    let version: i64 = row.try_get("version").map_err(decode_err)?;

    Ok(Request {
        id: RequestId(id),
        title: row.try_get("title").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        created_by_id: row.try_get("created_by_id").map_err(decode_err)?,
        recipient: RequestRecipient::parse(&recipient_type, &recipient_id).map_err(decode_err)?,
        status: status.parse::<RequestStatus>().map_err(decode_err)?,
        accepted_by_id: row.try_get("accepted_by_id").map_err(decode_err)?,
        rejection_reason: row.try_get("rejection_reason").map_err(decode_err)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        version: u32::try_from(version)
            .map_err(|_| RepositoryError::Decode(format!("version `{version}` out of range")))?,
    })
}

#[async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn save(&self, request: &Request) -> Result<(), StorageError> {
        match self.upsert(request).await? {
            0 => Err(StorageError::Conflict(request.id.0.clone())),
            _ => Ok(()),
        }
    }

    async fn get_by_id(&self, id: &RequestId) -> Result<Option<Request>, StorageError> {
        Ok(self.fetch_one(id).await?)
    }

    async fn find_by_created_by_id(&self, user_id: &str) -> Result<Vec<Request>, StorageError> {
        Ok(self.fetch_where("created_by_id", user_id).await?)
    }

    async fn find_by_accepted_by_id(&self, user_id: &str) -> Result<Vec<Request>, StorageError> {
        Ok(self.fetch_where("accepted_by_id", user_id).await?)
    }

    async fn find_by_recipient(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
    ) -> Result<Vec<Request>, StorageError> {
        Ok(self.fetch_for_recipient(recipient_id, kind, &[]).await?)
    }

    async fn find_by_recipient_and_statuses(
        &self,
        recipient_id: &str,
        kind: RecipientKind,
        statuses: &[RequestStatus],
    ) -> Result<Vec<Request>, StorageError> {
        Ok(self.fetch_for_recipient(recipient_id, kind, statuses).await?)
    }
}
