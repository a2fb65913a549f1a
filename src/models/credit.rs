//! Credit wallet, ledger and pricing models.
//!
//! Every organization owns one wallet. The wallet balance only changes together with
//! an appended `credit_txns` row, so the balance always equals the sum of the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a credit wallet record from the database.
///
/// # Database Table
///
/// Maps to `credit_wallets`:
/// - `balance` is never negative (CHECK constraint)
/// - `lifetime_spent` only grows, by the amount of each usage deduction
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CreditWallet {
    pub id: Uuid,
    pub org_id: Uuid,
    pub balance: i64,
    pub lifetime_spent: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable ledger entry.
///
/// `delta` is negative for usage and positive for everything else.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CreditTxn {
    pub id: Uuid,
    pub org_id: Uuid,
    pub delta: i64,

    /// One of `PURCHASE`, `USAGE`, `REFUND`, `ADMIN_GRANT`, `TRIAL_BONUS`
    pub reason: String,

    /// What the entry refers to: a checkout session, draft or brief id
    pub ref_id: Option<String>,

    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Reasons a credit can be added to a wallet. Usage is recorded by the deduction path only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreditReason {
    Purchase,
    Refund,
    AdminGrant,
    TrialBonus,
}

impl CreditReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditReason::Purchase => "PURCHASE",
            CreditReason::Refund => "REFUND",
            CreditReason::AdminGrant => "ADMIN_GRANT",
            CreditReason::TrialBonus => "TRIAL_BONUS",
        }
    }
}

/// Billable actions listed in the pricing matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    KeywordFetch,
    Cluster,
    Outline,
    Draft,
    SeoScore,
    LinkUpdate,
    Export,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::KeywordFetch => "KEYWORD_FETCH",
            ActionType::Cluster => "CLUSTER",
            ActionType::Outline => "OUTLINE",
            ActionType::Draft => "DRAFT",
            ActionType::SeoScore => "SEO_SCORE",
            ActionType::LinkUpdate => "LINK_UPDATE",
            ActionType::Export => "EXPORT",
        }
    }
}

/// A row of the pricing matrix.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PricingRule {
    pub action: String,
    pub credits_per_unit: i64,
    pub min_charge: i64,
    pub description: Option<String>,
    pub is_active: bool,
}

impl PricingRule {
    /// `max(credits_per_unit * units, min_charge)`.
    pub fn cost_for(&self, units: i64) -> i64 {
        self.credits_per_unit
            .saturating_mul(units)
            .max(self.min_charge)
    }
}

/// A purchasable bundle of credits.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditPackage {
    pub id: Uuid,
    pub name: String,
    pub credits_amount: i64,

    /// Price in cents (never floats!)
    pub price_cents: i64,

    pub stripe_price_id: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Package as returned to clients, with the price also given in dollars.
#[derive(Debug, Serialize)]
pub struct CreditPackageResponse {
    pub id: Uuid,
    pub name: String,
    pub credits_amount: i64,
    pub price_cents: i64,
    pub price_usd: f64,
    pub stripe_price_id: Option<String>,
}

impl From<CreditPackage> for CreditPackageResponse {
    fn from(pkg: CreditPackage) -> Self {
        Self {
            id: pkg.id,
            name: pkg.name,
            credits_amount: pkg.credits_amount,
            price_cents: pkg.price_cents,
            price_usd: pkg.price_cents as f64 / 100.0,
            stripe_price_id: pkg.stripe_price_id,
        }
    }
}

/// Credit cost of generating one article end to end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationEstimate {
    pub word_count: i64,
    pub outline: i64,
    pub draft: i64,
    pub seo_score: i64,
    pub total: i64,
}

/// Estimate plus whether the caller's organization can currently afford it.
#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    #[serde(flatten)]
    pub estimate: GenerationEstimate,
    pub sufficient_credits: bool,
}

#[derive(Debug, Deserialize)]
pub struct EstimateQuery {
    pub word_count: Option<i64>,
}

/// Request body for `POST /api/admin/credits/grant`.
///
/// # JSON Example
///
/// ```json
/// {
///   "org_id": "550e8400-e29b-41d4-a716-446655440000",
///   "amount": 500,
///   "reason": "Support goodwill"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    pub org_id: Option<Uuid>,
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GrantCreditsResponse {
    pub org_id: Uuid,
    pub amount: i64,
    pub new_balance: i64,
}

/// Request body for `POST /api/stripe/checkout`.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub package_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(per_unit: i64, min_charge: i64) -> PricingRule {
        PricingRule {
            action: "DRAFT".into(),
            credits_per_unit: per_unit,
            min_charge,
            description: None,
            is_active: true,
        }
    }

    #[test]
    fn cost_is_never_below_minimum_charge() {
        assert_eq!(rule(5, 1).cost_for(1), 5);
        assert_eq!(rule(5, 1).cost_for(3), 15);
        assert_eq!(rule(1, 10).cost_for(2), 10);
        assert_eq!(rule(15, 15).cost_for(0), 15);
    }

    #[test]
    fn package_price_is_exposed_in_dollars() {
        let pkg = CreditPackage {
            id: Uuid::new_v4(),
            name: "Starter".into(),
            credits_amount: 300,
            price_cents: 1500,
            stripe_price_id: None,
            is_active: true,
            created_at: Utc::now(),
        };
        let response = CreditPackageResponse::from(pkg);
        assert_eq!(response.price_usd, 15.0);
    }

    #[test]
    fn action_names_match_pricing_rows() {
        assert_eq!(ActionType::SeoScore.as_str(), "SEO_SCORE");
        assert_eq!(ActionType::KeywordFetch.as_str(), "KEYWORD_FETCH");
        assert_eq!(CreditReason::AdminGrant.as_str(), "ADMIN_GRANT");
    }
}
