use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Interview template: the question set and the voice agent that conducts it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    /// `None` for shared templates offered to every tenant.
    pub tenant_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub questions: Value,
    pub agent_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TemplateRow {
    pub fn available_to(&self, tenant_id: Uuid) -> bool {
        self.is_active && self.tenant_id.map_or(true, |owner| owner == tenant_id)
    }
}
