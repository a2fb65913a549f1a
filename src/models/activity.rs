//! Audit trail actions and admin dashboard counters.

use serde::Serialize;

/// Actions recorded in `activity_logs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    CreditsGranted,
    CreditsPurchased,
    UserRoleChanged,
    PartnerApproved,
    PartnerRejected,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::CreditsGranted => "CREDITS_GRANTED",
            ActivityAction::CreditsPurchased => "CREDITS_PURCHASED",
            ActivityAction::UserRoleChanged => "USER_ROLE_CHANGED",
            ActivityAction::PartnerApproved => "PARTNER_APPROVED",
            ActivityAction::PartnerRejected => "PARTNER_REJECTED",
        }
    }
}

/// Platform-wide counters for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_orgs: i64,
    pub total_credits_issued: i64,
    pub total_credits_spent: i64,
    pub total_projects: i64,
    pub failed_jobs: i64,
    pub recent_activity: RecentActivity,
}

/// Counts over the last seven days.
#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub new_users: i64,
    pub credit_purchases: i64,
    pub drafts_created: i64,
}
