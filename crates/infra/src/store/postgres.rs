//! Postgres-backed document and credential store.
//!
//! Documents are stored as JSONB next to the few columns needed for lookups
//! and filtering. Password hashes and revocation generations live in plain
//! tables of the same database. Account rows carry a `version` column used for optimistic
//! concurrency; a [`WriteBatch`] is applied inside one transaction.
//!
//! | SQLx error | PostgreSQL code | `StoreError` |
//! |---|---|---|
//! | unique violation | `23505` | `AlreadyExists` |
//! | serialization failure | `40001` | `Conflict` |
//! | anything else | | `Storage` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use rostergate_auth::{Account, RoleAssignment};
use rostergate_core::UserId;

use super::{
    AccountPage, AccountQuery, AssignmentFilter, CredentialStore, DocumentStore, StoreError, StoredCredential,
    WriteBatch, WriteOp,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    uid             TEXT PRIMARY KEY,
    email           TEXT NOT NULL UNIQUE,
    approval_status TEXT NOT NULL,
    doc             JSONB NOT NULL,
    version         BIGINT NOT NULL
);
CREATE TABLE IF NOT EXISTS role_assignments (
    id          UUID PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES accounts(uid),
    role        TEXT NOT NULL,
    valid_from  TIMESTAMPTZ NOT NULL,
    valid_until TIMESTAMPTZ NULL,
    doc         JSONB NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS role_assignments_one_open
    ON role_assignments (user_id, role) WHERE valid_until IS NULL;
CREATE TABLE IF NOT EXISTS credentials (
    subject        TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,
    email_verified BOOLEAN NOT NULL DEFAULT FALSE
);
CREATE TABLE IF NOT EXISTS token_generations (
    subject    TEXT PRIMARY KEY,
    generation BIGINT NOT NULL
);
"#;

#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

fn account_from_row(row: &sqlx::postgres::PgRow) -> Result<Account, StoreError> {
    let doc: serde_json::Value = row.try_get("doc").map_err(|e| map_sqlx_error("decode", e))?;
    let version: i64 = row.try_get("version").map_err(|e| map_sqlx_error("decode", e))?;
    let mut account: Account = serde_json::from_value(doc)
        .map_err(|e| StoreError::Storage(format!("failed to deserialize account: {e}")))?;
    account.version = u64::try_from(version).unwrap_or_default();
    Ok(account)
}

fn to_doc<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Storage(format!("failed to serialize document: {e}")))
}

async fn put_account(
    tx: &mut Transaction<'_, Postgres>,
    account: &Account,
    expected_version: Option<u64>,
) -> Result<(), StoreError> {
    let doc = to_doc(account)?;
    let status = account.approval_status.as_str();
    let updated = match expected_version {
        Some(expected) => sqlx::query(
            r#"
            UPDATE accounts
            SET email = $2, approval_status = $3, doc = $4, version = version + 1
            WHERE uid = $1 AND version = $5
            "#,
        )
        .bind(account.uid.as_str())
        .bind(&account.email)
        .bind(status)
        .bind(&doc)
        .bind(expected as i64)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("put_account", e))?
        .rows_affected(),
        None => sqlx::query(
            r#"
            INSERT INTO accounts (uid, email, approval_status, doc, version)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT (uid) DO UPDATE
            SET email = EXCLUDED.email,
                approval_status = EXCLUDED.approval_status,
                doc = EXCLUDED.doc,
                version = accounts.version + 1
            "#,
        )
        .bind(account.uid.as_str())
        .bind(&account.email)
        .bind(status)
        .bind(&doc)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("put_account", e))?
        .rows_affected(),
    };
    if updated == 0 {
        return Err(StoreError::Conflict(format!(
            "account {} expected version {expected_version:?}",
            account.uid
        )));
    }
    Ok(())
}

async fn insert_account(tx: &mut Transaction<'_, Postgres>, account: &Account) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (uid, email, approval_status, doc, version)
        VALUES ($1, $2, $3, $4, 1)
        "#,
    )
    .bind(account.uid.as_str())
    .bind(&account.email)
    .bind(account.approval_status.as_str())
    .bind(to_doc(account)?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_account", e))?;
    Ok(())
}

async fn put_assignment(tx: &mut Transaction<'_, Postgres>, record: &RoleAssignment) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO role_assignments (id, user_id, role, valid_from, valid_until, doc)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE
        SET valid_until = EXCLUDED.valid_until, doc = EXCLUDED.doc
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.user_id.as_str())
    .bind(record.role.as_str())
    .bind(record.valid_from)
    .bind(record.valid_until)
    .bind(to_doc(record)?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("put_assignment", e))?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), fields(uid = %uid), err)]
    async fn get_account(&self, uid: &UserId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query("SELECT doc, version FROM accounts WHERE uid = $1")
            .bind(uid.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_account", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query("SELECT doc, version FROM accounts WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_account_by_email", e))?;
        row.as_ref().map(account_from_row).transpose()
    }

    #[instrument(skip(self, account), fields(uid = %account.uid), err)]
    async fn insert_account(&self, mut account: Account) -> Result<Account, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (uid, email, approval_status, doc, version)
            VALUES ($1, $2, $3, $4, 1)
            "#,
        )
        .bind(account.uid.as_str())
        .bind(&account.email)
        .bind(account.approval_status.as_str())
        .bind(to_doc(&account)?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        account.version = 1;
        Ok(account)
    }

    #[instrument(skip(self), err)]
    async fn query_accounts(&self, query: &AccountQuery) -> Result<AccountPage, StoreError> {
        let status = query.status.map(|s| s.as_str());
        let role = query.role.map(|r| r.as_str());
        let page_size = query.effective_page_size();

        let total: i64 = sqlx::query(
            r#"
            SELECT COUNT(*) AS total FROM accounts
            WHERE ($1::TEXT IS NULL OR approval_status = $1)
              AND ($2::TEXT IS NULL OR doc->'roles' ? $2)
            "#,
        )
        .bind(status)
        .bind(role)
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("total"))
        .map_err(|e| map_sqlx_error("query_accounts", e))?;

        let rows = sqlx::query(
            r#"
            SELECT doc, version FROM accounts
            WHERE ($1::TEXT IS NULL OR approval_status = $1)
              AND ($2::TEXT IS NULL OR doc->'roles' ? $2)
              AND ($3::TEXT IS NULL OR uid > $3)
            ORDER BY uid ASC
            LIMIT $4
            "#,
        )
        .bind(status)
        .bind(role)
        .bind(query.page_token.as_deref())
        .bind((page_size + 1) as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_accounts", e))?;

        let mut accounts = rows.iter().map(account_from_row).collect::<Result<Vec<_>, _>>()?;
        let next_page_token = if accounts.len() > page_size {
            accounts.truncate(page_size);
            accounts.last().map(|a| a.uid.to_string())
        } else {
            None
        };

        Ok(AccountPage {
            accounts,
            next_page_token,
            total: usize::try_from(total).unwrap_or_default(),
        })
    }

    #[instrument(skip(self), fields(user = %user), err)]
    async fn assignments_for(
        &self,
        user: &UserId,
        filter: AssignmentFilter,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM role_assignments
            WHERE user_id = $1
              AND ($2::TEXT IS NULL OR role = $2)
              AND (NOT $3 OR valid_until IS NULL)
            ORDER BY valid_from ASC
            "#,
        )
        .bind(user.as_str())
        .bind(filter.role.map(|r| r.as_str()))
        .bind(filter.active_only)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assignments_for", e))?;

        rows.iter()
            .map(|row| {
                let doc: serde_json::Value = row.try_get("doc").map_err(|e| map_sqlx_error("decode", e))?;
                serde_json::from_value(doc)
                    .map_err(|e| StoreError::Storage(format!("failed to deserialize assignment: {e}")))
            })
            .collect()
    }

    #[instrument(skip(self, batch), fields(ops = batch.len()), err)]
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("commit.begin", e))?;

        for op in batch.ops() {
            match op {
                WriteOp::PutAccount {
                    account,
                    expected_version,
                } => put_account(&mut tx, account, *expected_version).await?,
                WriteOp::InsertAccount(account) => insert_account(&mut tx, account).await?,
                WriteOp::PutAssignment(record) => put_assignment(&mut tx, record).await?,
            }
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PostgresDocumentStore {
    #[instrument(skip(self), err)]
    async fn find_credential(&self, email: &str) -> Result<Option<StoredCredential>, StoreError> {
        let row = sqlx::query(
            "SELECT subject, email, password_hash, email_verified FROM credentials WHERE email = lower($1)",
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_credential", e))?;

        row.map(|row| {
            let subject: String = row.try_get("subject").map_err(|e| map_sqlx_error("decode", e))?;
            Ok(StoredCredential {
                subject: UserId::new(subject),
                email: row.try_get("email").map_err(|e| map_sqlx_error("decode", e))?,
                password_hash: row.try_get("password_hash").map_err(|e| map_sqlx_error("decode", e))?,
                email_verified: row.try_get("email_verified").map_err(|e| map_sqlx_error("decode", e))?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, credential), fields(subject = %credential.subject), err)]
    async fn insert_credential(&self, credential: StoredCredential) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO credentials (subject, email, password_hash, email_verified)
            VALUES ($1, lower($2), $3, $4)
            "#,
        )
        .bind(credential.subject.as_str())
        .bind(&credential.email)
        .bind(&credential.password_hash)
        .bind(credential.email_verified)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_credential", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(subject = %subject), err)]
    async fn delete_credential(&self, subject: &UserId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM credentials WHERE subject = $1")
            .bind(subject.as_str())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_credential", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(subject = %subject), err)]
    async fn token_generation(&self, subject: &UserId) -> Result<u64, StoreError> {
        let generation: Option<i64> = sqlx::query("SELECT generation FROM token_generations WHERE subject = $1")
            .bind(subject.as_str())
            .fetch_optional(&*self.pool)
            .await
            .and_then(|row| row.map(|r| r.try_get("generation")).transpose())
            .map_err(|e| map_sqlx_error("token_generation", e))?;
        Ok(generation.and_then(|g| u64::try_from(g).ok()).unwrap_or(0))
    }

    #[instrument(skip(self), fields(subject = %subject), err)]
    async fn bump_token_generation(&self, subject: &UserId) -> Result<u64, StoreError> {
        let generation: i64 = sqlx::query(
            r#"
            INSERT INTO token_generations (subject, generation)
            VALUES ($1, 1)
            ON CONFLICT (subject) DO UPDATE
            SET generation = token_generations.generation + 1
            RETURNING generation
            "#,
        )
        .bind(subject.as_str())
        .fetch_one(&*self.pool)
        .await
        .and_then(|row| row.try_get("generation"))
        .map_err(|e| map_sqlx_error("bump_token_generation", e))?;
        Ok(u64::try_from(generation).unwrap_or_default())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                Some("40001") => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
