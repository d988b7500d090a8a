//! PostgreSQL-backed `HandshakeSessionRepository` implementation.
//!
//! The `state` column carries a unique index, so a clashing insert surfaces
//! as `DuplicateState` and the store regenerates. `take_by_state` is a single
//! `DELETE ... RETURNING`, so concurrent callbacks cannot both receive a
//! session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::ports::{HandshakeSessionRepository, HandshakeSessionRepositoryError};
use crate::domain::{AccountId, HandshakeSession};

use super::diesel_basic_error_mapping::{
    is_unique_violation, map_basic_diesel_error, map_basic_pool_error, rows_affected,
};
use super::models::HandshakeSessionRow;
use super::pool::{DbPool, PoolError};
use super::schema::auth_handshake_sessions;

/// Diesel-backed implementation of the `HandshakeSessionRepository` port.
#[derive(Clone)]
pub struct DieselHandshakeSessionRepository {
    pool: DbPool,
}

impl DieselHandshakeSessionRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> HandshakeSessionRepositoryError {
    map_basic_pool_error(error, HandshakeSessionRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> HandshakeSessionRepositoryError {
    if is_unique_violation(&error) {
        return HandshakeSessionRepositoryError::duplicate_state();
    }
    map_basic_diesel_error(
        error,
        HandshakeSessionRepositoryError::query,
        HandshakeSessionRepositoryError::connection,
    )
}

fn session_to_row(session: &HandshakeSession) -> HandshakeSessionRow {
    HandshakeSessionRow {
        session_id: session.session_id,
        state: session.state.clone(),
        code_verifier: session.code_verifier.as_str().to_owned(),
        account: session.account.to_string(),
        created_at: session.created_at,
        expires_at: session.expires_at,
    }
}

fn row_to_session(
    row: HandshakeSessionRow,
) -> Result<HandshakeSession, HandshakeSessionRepositoryError> {
    let account = AccountId::new(&row.account).map_err(|err| {
        HandshakeSessionRepositoryError::query(format!("invalid handshake account: {err}"))
    })?;
    Ok(HandshakeSession {
        session_id: row.session_id,
        state: row.state,
        code_verifier: Zeroizing::new(row.code_verifier),
        account,
        created_at: row.created_at,
        expires_at: row.expires_at,
    })
}

#[async_trait]
impl HandshakeSessionRepository for DieselHandshakeSessionRepository {
    async fn insert(
        &self,
        session: &HandshakeSession,
    ) -> Result<(), HandshakeSessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(auth_handshake_sessions::table)
            .values(&session_to_row(session))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn find_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<HandshakeSessionRow> = auth_handshake_sessions::table
            .filter(auth_handshake_sessions::state.eq(state))
            .select(HandshakeSessionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_session).transpose()
    }

    async fn take_by_state(
        &self,
        state: &str,
    ) -> Result<Option<HandshakeSession>, HandshakeSessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<HandshakeSessionRow> = diesel::delete(
            auth_handshake_sessions::table.filter(auth_handshake_sessions::state.eq(state)),
        )
        .returning(HandshakeSessionRow::as_returning())
        .get_result(&mut conn)
        .await
        .optional()
        .map_err(map_diesel_error)?;
        row.map(row_to_session).transpose()
    }

    async fn delete(&self, session_id: &Uuid) -> Result<bool, HandshakeSessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            auth_handshake_sessions::table
                .filter(auth_handshake_sessions::session_id.eq(session_id)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, HandshakeSessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            auth_handshake_sessions::table.filter(auth_handshake_sessions::expires_at.lt(now)),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        debug!(deleted, cutoff = %now, "deleted expired handshake sessions");
        Ok(rows_affected(deleted))
    }
}
