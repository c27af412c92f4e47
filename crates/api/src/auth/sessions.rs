//! User session management for token revocation
//!
//! Sessions are tracked in the `user_sessions` table keyed by JTI. A token
//! is only honored while its session row is unrevoked and unexpired, so
//! logout and forced revocation take effect immediately.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use dukapo_shared::AppResult;

/// Maximum concurrent sessions per user; the oldest is revoked past this.
const MAX_SESSIONS_PER_USER: i64 = 10;

/// Save a new session. Called immediately after token issue.
pub async fn save_session(
    pool: &PgPool,
    user_id: Uuid,
    tenant_id: Uuid,
    jti: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let session_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM user_sessions
        WHERE user_id = $1
          AND revoked_at IS NULL
          AND expires_at > NOW()
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    if session_count >= MAX_SESSIONS_PER_USER {
        tracing::info!(
            user_id = %user_id,
            current_sessions = session_count,
            max_sessions = MAX_SESSIONS_PER_USER,
            "Revoking oldest session due to max sessions limit"
        );

        sqlx::query(
            r#"
            UPDATE user_sessions
            SET revoked_at = NOW(),
                revocation_reason = 'max_sessions_exceeded'
            WHERE id IN (
                SELECT id FROM user_sessions
                WHERE user_id = $1
                  AND revoked_at IS NULL
                ORDER BY created_at ASC
                LIMIT 1
            )
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO user_sessions (user_id, tenant_id, jti, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(user_id)
    .bind(tenant_id)
    .bind(jti)
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

/// Check a session (by JTI) is valid: owned by this user, unrevoked,
/// unexpired. Run by the middleware on every request.
pub async fn is_session_valid(pool: &PgPool, jti: &str, expected_user_id: Uuid) -> AppResult<bool> {
    let result: Option<bool> = sqlx::query_scalar(
        r#"
        SELECT TRUE
        FROM user_sessions
        WHERE jti = $1
          AND user_id = $2
          AND revoked_at IS NULL
          AND expires_at > NOW()
        "#,
    )
    .bind(jti)
    .bind(expected_user_id)
    .fetch_optional(pool)
    .await?;

    Ok(result.is_some())
}

/// Revoke a specific session by JTI. Returns whether a row was revoked.
pub async fn revoke_session(pool: &PgPool, jti: &str, reason: &str) -> AppResult<bool> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE user_sessions
        SET revoked_at = NOW(),
            revocation_reason = $2
        WHERE jti = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(jti)
    .bind(reason)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

/// Revoke all of a user's sessions (password change, suspension).
pub async fn revoke_all_sessions(pool: &PgPool, user_id: Uuid, reason: &str) -> AppResult<u64> {
    let rows_affected = sqlx::query(
        r#"
        UPDATE user_sessions
        SET revoked_at = NOW(),
            revocation_reason = $2
        WHERE user_id = $1
          AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(reason)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected)
}
