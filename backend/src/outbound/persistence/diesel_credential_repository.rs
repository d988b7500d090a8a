//! PostgreSQL-backed `CredentialRepository` implementation.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{CredentialRepository, CredentialRepositoryError};
use crate::domain::{AccountId, Credential, StoredCredential};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{CredentialRow, NewCredentialRow};
use super::pool::{DbPool, PoolError};
use super::schema::credentials;

/// Diesel-backed implementation of the `CredentialRepository` port.
#[derive(Clone)]
pub struct DieselCredentialRepository {
    pool: DbPool,
}

impl DieselCredentialRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> CredentialRepositoryError {
    map_basic_pool_error(error, CredentialRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> CredentialRepositoryError {
    map_basic_diesel_error(
        error,
        CredentialRepositoryError::query,
        CredentialRepositoryError::connection,
    )
}

fn row_to_credential(row: CredentialRow) -> Credential {
    Credential::new(row.access_token, row.refresh_token, row.expires_at)
}

fn row_to_stored(row: CredentialRow) -> Result<StoredCredential, CredentialRepositoryError> {
    let account = AccountId::new(&row.account).map_err(|err| {
        CredentialRepositoryError::query(format!("invalid credential account: {err}"))
    })?;
    Ok(StoredCredential {
        account,
        credential: row_to_credential(row),
    })
}

#[async_trait]
impl CredentialRepository for DieselCredentialRepository {
    async fn find(
        &self,
        account: &AccountId,
    ) -> Result<Option<Credential>, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<CredentialRow> = credentials::table
            .filter(credentials::account.eq(account.as_ref()))
            .select(CredentialRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(row_to_credential))
    }

    async fn upsert(
        &self,
        account: &AccountId,
        credential: &Credential,
    ) -> Result<(), CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewCredentialRow {
            account: account.as_ref(),
            access_token: credential.access_token(),
            refresh_token: credential.refresh_token(),
            expires_at: credential.expires_at(),
            updated_at: Utc::now(),
        };
        diesel::insert_into(credentials::table)
            .values(&row)
            .on_conflict(credentials::account)
            .do_update()
            .set(&row)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn delete(&self, account: &AccountId) -> Result<bool, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted =
            diesel::delete(credentials::table.filter(credentials::account.eq(account.as_ref())))
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn list_all(&self) -> Result<Vec<StoredCredential>, CredentialRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<CredentialRow> = credentials::table
            .select(CredentialRow::as_select())
            .order_by(credentials::account)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_stored).collect()
    }
}

#[cfg(test)]
mod tests {
    //! Row mapping coverage; query behaviour runs against PostgreSQL.
    use super::*;
    use crate::test_support::{account, fixed_now};
    use rstest::rstest;

    fn row(account: &str) -> CredentialRow {
        CredentialRow {
            account: account.to_owned(),
            access_token: "access".to_owned(),
            refresh_token: "refresh".to_owned(),
            expires_at: fixed_now(),
        }
    }

    #[rstest]
    fn rows_become_stored_credentials() {
        let stored = row_to_stored(row("a@b.com")).expect("row converts");
        assert_eq!(stored.account, account("a@b.com"));
        assert_eq!(stored.credential.access_token(), "access");
        assert_eq!(stored.credential.refresh_token(), "refresh");
        assert_eq!(stored.credential.expires_at(), fixed_now());
    }

    #[rstest]
    fn blank_account_rows_are_rejected() {
        assert!(matches!(
            row_to_stored(row("")),
            Err(CredentialRepositoryError::Query { .. })
        ));
    }
}
