use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Quota columns of a tenant (a company, a student or a general user).
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: Uuid,
    pub quota_used: i32,
    pub quota_limit: i32,
}

/// `used` counts completed sessions; `limit` is checked when a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TenantQuota {
    pub tenant_id: Uuid,
    pub used: u32,
    pub limit: u32,
}

impl TenantQuota {
    pub fn has_capacity(&self) -> bool {
        self.used < self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}

impl From<&TenantRow> for TenantQuota {
    fn from(row: &TenantRow) -> Self {
        Self {
            tenant_id: row.id,
            used: row.quota_used.max(0) as u32,
            limit: row.quota_limit.max(0) as u32,
        }
    }
}
