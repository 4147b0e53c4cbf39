//! Session persistence.
//!
//! The lifecycle only sees [`SessionStore`]. Two rules hold for every implementation:
//! creating a session and checking the owner's quota are one atomic step, and completing a
//! session is a compare-and-swap on `status` whose winner alone bumps the quota counter.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::session::{CorruptRow, InterviewSession, NewSession, SessionRow};
use crate::models::template::TemplateRow;
use crate::models::tenant::{TenantQuota, TenantRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("tenant {0} not found")]
    TenantNotFound(Uuid),

    #[error("quota exceeded: {used}/{limit} sessions used")]
    QuotaExceeded { used: u32, limit: u32 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Corrupt(#[from] CorruptRow),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_template(&self, template_id: Uuid) -> Result<Option<TemplateRow>, StoreError>;

    async fn get_quota(&self, tenant_id: Uuid) -> Result<Option<TenantQuota>, StoreError>;

    /// Inserts a new session if the tenant still has quota. Nothing is written otherwise.
    async fn create_session(&self, new: NewSession) -> Result<InterviewSession, StoreError>;

    /// Looks a session up within its owner's scope.
    async fn find_session(
        &self,
        session_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<InterviewSession>, StoreError>;

    async fn list_sessions(&self, tenant_id: Uuid) -> Result<Vec<InterviewSession>, StoreError>;

    /// Writes the mutable fields of a session that is not completed.
    /// Returns `false` if the stored session was already completed (nothing written).
    async fn save_session(&self, session: &InterviewSession) -> Result<bool, StoreError>;

    /// Writes `session` as completed and adds one to the owner's used quota, only if the
    /// stored status is not already `completed`. Returns whether this call did the transition.
    async fn complete_session(&self, session: &InterviewSession) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPDATE_SESSION_SQL: &str = r#"
    UPDATE sessions
    SET status = $3,
        conversation_id = $4,
        responses = $5,
        client_score = $6,
        transcript = $7,
        audio_ref = $8,
        analysis = $9,
        final_score = $10,
        started_at = $11,
        completed_at = $12,
        updated_at = $13
    WHERE id = $1 AND tenant_id = $2 AND status <> 'completed'
"#;

fn bind_update<'q>(
    session: &'q InterviewSession,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(UPDATE_SESSION_SQL)
        .bind(session.id)
        .bind(session.tenant_id)
        .bind(session.status.as_str())
        .bind(session.conversation_id.as_deref())
        .bind(Json(&session.responses))
        .bind(session.client_score)
        .bind(session.transcript.as_ref())
        .bind(session.audio_ref.as_deref())
        .bind(session.analysis.as_ref().map(Json))
        .bind(session.final_score.as_ref().map(Json))
        .bind(session.started_at)
        .bind(session.completed_at)
        .bind(session.updated_at)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_template(&self, template_id: Uuid) -> Result<Option<TemplateRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = $1")
                .bind(template_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_quota(&self, tenant_id: Uuid) -> Result<Option<TenantQuota>, StoreError> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, quota_used, quota_limit FROM tenants WHERE id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(TenantQuota::from))
    }

    async fn create_session(&self, new: NewSession) -> Result<InterviewSession, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent creations for the same tenant.
        let tenant = sqlx::query_as::<_, TenantRow>(
            "SELECT id, quota_used, quota_limit FROM tenants WHERE id = $1 FOR UPDATE",
        )
        .bind(new.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::TenantNotFound(new.tenant_id))?;

        let quota = TenantQuota::from(&tenant);
        if !quota.has_capacity() {
            return Err(StoreError::QuotaExceeded {
                used: quota.used,
                limit: quota.limit,
            });
        }

        let session = InterviewSession::new(new, Utc::now());
        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, tenant_id, template_id, kind, candidate_name, candidate_email,
                 status, responses, scheduled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(session.tenant_id)
        .bind(session.template_id)
        .bind(session.kind.as_str())
        .bind(session.candidate_name.as_deref())
        .bind(session.candidate_email.as_deref())
        .bind(session.status.as_str())
        .bind(Json(&session.responses))
        .bind(session.scheduled_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "Created {} session {} for tenant {} ({}/{} used)",
            session.kind.as_str(),
            session.id,
            session.tenant_id,
            quota.used,
            quota.limit
        );
        Ok(session)
    }

    async fn find_session(
        &self,
        session_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<InterviewSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE id = $1 AND tenant_id = $2",
        )
        .bind(session_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(InterviewSession::try_from).transpose()?)
    }

    async fn list_sessions(&self, tenant_id: Uuid) -> Result<Vec<InterviewSession>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM sessions WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT 200",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| InterviewSession::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn save_session(&self, session: &InterviewSession) -> Result<bool, StoreError> {
        let result = bind_update(session).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_session(&self, session: &InterviewSession) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = bind_update(session).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE tenants SET quota_used = quota_used + 1, updated_at = now() WHERE id = $1",
        )
        .bind(session.tenant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-process store with the same atomicity rules, for lifecycle tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::{SessionStore, StoreError};
    use crate::models::session::{InterviewSession, NewSession, SessionStatus};
    use crate::models::template::TemplateRow;
    use crate::models::tenant::TenantQuota;

    #[derive(Default)]
    pub struct MemoryStore {
        tenants: Mutex<HashMap<Uuid, TenantQuota>>,
        templates: Mutex<HashMap<Uuid, TemplateRow>>,
        sessions: Mutex<HashMap<Uuid, InterviewSession>>,
    }

    impl MemoryStore {
        pub fn add_tenant(&self, used: u32, limit: u32) -> Uuid {
            let tenant_id = Uuid::new_v4();
            self.tenants.lock().unwrap().insert(
                tenant_id,
                TenantQuota {
                    tenant_id,
                    used,
                    limit,
                },
            );
            tenant_id
        }

        pub fn add_template(&self, tenant_id: Option<Uuid>, agent_id: Option<&str>) -> Uuid {
            let id = Uuid::new_v4();
            self.templates.lock().unwrap().insert(
                id,
                TemplateRow {
                    id,
                    tenant_id,
                    title: "Backend Engineer".to_string(),
                    description: None,
                    questions: json!(["Tell me about a system you built."]),
                    agent_id: agent_id.map(str::to_string),
                    is_active: true,
                    created_at: Utc::now(),
                },
            );
            id
        }

        pub fn quota(&self, tenant_id: Uuid) -> TenantQuota {
            self.tenants.lock().unwrap()[&tenant_id]
        }

        pub fn session(&self, session_id: Uuid) -> InterviewSession {
            self.sessions.lock().unwrap()[&session_id].clone()
        }

        pub fn session_count(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SessionStore for MemoryStore {
        async fn find_template(&self, template_id: Uuid) -> Result<Option<TemplateRow>, StoreError> {
            Ok(self.templates.lock().unwrap().get(&template_id).cloned())
        }

        async fn get_quota(&self, tenant_id: Uuid) -> Result<Option<TenantQuota>, StoreError> {
            Ok(self.tenants.lock().unwrap().get(&tenant_id).copied())
        }

        async fn create_session(&self, new: NewSession) -> Result<InterviewSession, StoreError> {
            let tenants = self.tenants.lock().unwrap();
            let quota = tenants
                .get(&new.tenant_id)
                .ok_or(StoreError::TenantNotFound(new.tenant_id))?;
            if !quota.has_capacity() {
                return Err(StoreError::QuotaExceeded {
                    used: quota.used,
                    limit: quota.limit,
                });
            }
            let session = InterviewSession::new(new, Utc::now());
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(session)
        }

        async fn find_session(
            &self,
            session_id: Uuid,
            tenant_id: Uuid,
        ) -> Result<Option<InterviewSession>, StoreError> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(&session_id)
                .filter(|s| s.tenant_id == tenant_id)
                .cloned())
        }

        async fn list_sessions(&self, tenant_id: Uuid) -> Result<Vec<InterviewSession>, StoreError> {
            let mut sessions: Vec<_> = self
                .sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.tenant_id == tenant_id)
                .cloned()
                .collect();
            sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(sessions)
        }

        async fn save_session(&self, session: &InterviewSession) -> Result<bool, StoreError> {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(&session.id) {
                Some(stored)
                    if stored.tenant_id == session.tenant_id
                        && stored.status != SessionStatus::Completed =>
                {
                    *stored = session.clone();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn complete_session(&self, session: &InterviewSession) -> Result<bool, StoreError> {
            let mut tenants = self.tenants.lock().unwrap();
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get_mut(&session.id) {
                Some(stored)
                    if stored.tenant_id == session.tenant_id
                        && stored.status != SessionStatus::Completed =>
                {
                    *stored = session.clone();
                    if let Some(quota) = tenants.get_mut(&session.tenant_id) {
                        quota.used += 1;
                    }
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }
}
