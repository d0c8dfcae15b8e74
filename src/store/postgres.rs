use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{PgPool, Row};

use super::{BatchOp, DocKey, DocumentStore, StoreError, WriteBatch};

/// 基于 Postgres JSONB 的文档存储，一个批次对应一个事务
pub struct PgDocumentStore {
    db: Arc<PgPool>,
}

impl PgDocumentStore {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, key: &DocKey) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM documents
            WHERE namespace = $1 AND id = $2
            "#,
        )
        .bind(&key.namespace)
        .bind(&key.id)
        .fetch_optional(&*self.db)
        .await?;

        Ok(row.map(|r| r.try_get::<Value, _>("body")).transpose()?)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Value>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM documents
            WHERE namespace = $1
            ORDER BY updated_at DESC
            "#,
        )
        .bind(namespace)
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter()
            .map(|r| r.try_get::<Value, _>("body").map_err(StoreError::from))
            .collect()
    }

    async fn list_by_id(
        &self,
        namespace_prefix: &str,
        id: &str,
    ) -> Result<Vec<(DocKey, Value)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT namespace, body FROM documents
            WHERE id = $1 AND starts_with(namespace, $2)
            "#,
        )
        .bind(id)
        .bind(namespace_prefix)
        .fetch_all(&*self.db)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<(DocKey, Value), StoreError> {
                let namespace: String = r.try_get("namespace")?;
                let body: Value = r.try_get("body")?;
                Ok((DocKey::new(namespace, id), body))
            })
            .collect()
    }

    async fn set(&self, key: &DocKey, doc: Value) -> Result<(), StoreError> {
        upsert(&*self.db, key, &doc).await
    }

    async fn update(&self, key: &DocKey, fields: Map<String, Value>) -> Result<(), StoreError> {
        patch(&*self.db, key, &fields).await
    }

    async fn delete(&self, key: &DocKey) -> Result<(), StoreError> {
        remove(&*self.db, key).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        // 开启事务
        let mut tx = self.db.begin().await?;

        // 锁住前置条件涉及的行并核对版本号
        for (key, expected) in batch.preconditions() {
            let row = sqlx::query(
                r#"
                SELECT (body->>'revision')::BIGINT AS revision
                FROM documents
                WHERE namespace = $1 AND id = $2
                FOR UPDATE
                "#,
            )
            .bind(&key.namespace)
            .bind(&key.id)
            .fetch_optional(&mut *tx)
            .await?;

            let found = match row {
                Some(r) => Some(r.try_get::<Option<i64>, _>("revision")?.unwrap_or(0) as u64),
                None => None,
            };

            if found != Some(*expected) {
                // tx 被 drop 时自动回滚
                return Err(StoreError::Conflict {
                    key: key.clone(),
                    expected: *expected,
                    found,
                });
            }
        }

        for op in batch.ops() {
            match op {
                BatchOp::Set { key, doc } => upsert(&mut *tx, key, doc).await?,
                BatchOp::Update { key, fields } => patch(&mut *tx, key, fields).await?,
                BatchOp::Delete { key } => remove(&mut *tx, key).await?,
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

async fn upsert<'e, E>(executor: E, key: &DocKey, doc: &Value) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO documents (namespace, id, body, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (namespace, id)
        DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()
        "#,
    )
    .bind(&key.namespace)
    .bind(&key.id)
    .bind(doc)
    .execute(executor)
    .await?;

    Ok(())
}

async fn patch<'e, E>(
    executor: E,
    key: &DocKey,
    fields: &Map<String, Value>,
) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    // jsonb 的 || 只合并顶层字段
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET body = body || $3, updated_at = NOW()
        WHERE namespace = $1 AND id = $2
        "#,
    )
    .bind(&key.namespace)
    .bind(&key.id)
    .bind(Value::Object(fields.clone()))
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(key.clone()));
    }

    Ok(())
}

async fn remove<'e, E>(executor: E, key: &DocKey) -> Result<(), StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        DELETE FROM documents
        WHERE namespace = $1 AND id = $2
        "#,
    )
    .bind(&key.namespace)
    .bind(&key.id)
    .execute(executor)
    .await?;

    Ok(())
}
