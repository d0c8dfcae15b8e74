// 用户目录
// 账号是否存在、屏蔽关系查询

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::store::StoreError;

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 账号存在且未被删除
    async fn account_exists(&self, user_id: &str) -> Result<bool, StoreError>;

    /// user_id 是否屏蔽了 target_id
    async fn is_blocked(&self, user_id: &str, target_id: &str) -> Result<bool, StoreError>;
}

/// 基于 users / user_blocks 表的用户目录
pub struct PgUserDirectory {
    db: Arc<PgPool>,
}

impl PgUserDirectory {
    pub fn new(db: Arc<PgPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn account_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE user_id = $1 AND deleted_at IS NULL
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(&*self.db)
        .await?;

        Ok(exists)
    }

    async fn is_blocked(&self, user_id: &str, target_id: &str) -> Result<bool, StoreError> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM user_blocks
                WHERE user_id = $1 AND blocked_id = $2
            )
            "#,
        )
        .bind(user_id)
        .bind(target_id)
        .fetch_one(&*self.db)
        .await?;

        Ok(blocked)
    }
}

/// 进程内用户目录，用于测试
#[derive(Default)]
pub struct MemoryUserDirectory {
    accounts: Mutex<HashSet<String>>,
    blocks: Mutex<HashSet<(String, String)>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dir = Self::default();
        for id in ids {
            dir.add_account(id);
        }
        dir
    }

    pub fn add_account(&self, user_id: impl Into<String>) {
        self.accounts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id.into());
    }

    pub fn remove_account(&self, user_id: &str) {
        self.accounts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(user_id);
    }

    pub fn block(&self, user_id: &str, target_id: &str) {
        self.blocks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert((user_id.to_string(), target_id.to_string()));
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn account_exists(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .accounts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(user_id))
    }

    async fn is_blocked(&self, user_id: &str, target_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .blocks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(user_id.to_string(), target_id.to_string())))
    }
}
