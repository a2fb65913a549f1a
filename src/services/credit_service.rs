//! Credit service - wallet balance and ledger operations.
//!
//! This service handles:
//! - Pricing lookups and cost estimates
//! - Balance checks before expensive work
//! - Atomic deductions and additions
//!
//! # Atomicity Guarantees
//!
//! A balance change and its ledger row are always written in the same PostgreSQL
//! transaction. Deductions lock the wallet row with `FOR UPDATE` and re-check the
//! balance under the lock, so concurrent requests cannot overdraw a wallet.
//!
//! The `*_in` variants take an open connection so callers can fold the ledger write
//! into a larger transaction (e.g. creating a draft and paying for it).

use crate::{
    db::DbPool,
    error::{AppError, is_unique_violation},
    models::credit::{
        ActionType, CreditPackage, CreditReason, CreditTxn, CreditWallet, GenerationEstimate,
        PricingRule,
    },
    models::response::PageParams,
};
use serde_json::{Value, json};
use sqlx::PgConnection;
use uuid::Uuid;

/// Words assumed when estimating a generation without an explicit length.
pub const DEFAULT_ESTIMATE_WORDS: i64 = 1500;

/// Credit cost of `units` of `action`: `max(credits_per_unit * units, min_charge)`.
///
/// # Errors
///
/// - `Internal`: the action has no active pricing row
pub async fn action_cost(pool: &DbPool, action: ActionType, units: i64) -> Result<i64, AppError> {
    let rule = sqlx::query_as::<_, PricingRule>(
        "SELECT action, credits_per_unit, min_charge, description, is_active
         FROM pricing_matrix WHERE action = $1",
    )
    .bind(action.as_str())
    .fetch_optional(pool)
    .await?
    .filter(|r| r.is_active)
    .ok_or_else(|| AppError::Internal(format!("No pricing found for action: {}", action.as_str())))?;

    Ok(rule.cost_for(units))
}

/// Number of DRAFT pricing units for an article: one per started thousand words.
pub fn draft_units(word_count: i64) -> i64 {
    (word_count.max(0) + 999) / 1000
}

/// Cost of outline + draft + SEO score for an article of `word_count` words.
pub async fn estimate_generation_cost(
    pool: &DbPool,
    word_count: i64,
) -> Result<GenerationEstimate, AppError> {
    let outline = action_cost(pool, ActionType::Outline, 1).await?;
    let draft = action_cost(pool, ActionType::Draft, draft_units(word_count)).await?;
    let seo_score = action_cost(pool, ActionType::SeoScore, 1).await?;

    Ok(GenerationEstimate {
        word_count,
        outline,
        draft,
        seo_score,
        total: outline + draft + seo_score,
    })
}

pub async fn find_wallet(pool: &DbPool, org_id: Uuid) -> Result<Option<CreditWallet>, AppError> {
    let wallet = sqlx::query_as::<_, CreditWallet>("SELECT * FROM credit_wallets WHERE org_id = $1")
        .bind(org_id)
        .fetch_optional(pool)
        .await?;
    Ok(wallet)
}

/// Return the organization's wallet, creating an empty one if it does not exist yet.
pub async fn wallet_or_create(pool: &DbPool, org_id: Uuid) -> Result<CreditWallet, AppError> {
    let wallet = sqlx::query_as::<_, CreditWallet>(
        r#"
        INSERT INTO credit_wallets (org_id, balance, lifetime_spent)
        VALUES ($1, 0, 0)
        ON CONFLICT (org_id) DO UPDATE SET org_id = EXCLUDED.org_id
        RETURNING *
        "#,
    )
    .bind(org_id)
    .fetch_one(pool)
    .await?;
    Ok(wallet)
}

/// Current balance, zero when the organization has no wallet.
pub async fn balance(pool: &DbPool, org_id: Uuid) -> Result<i64, AppError> {
    Ok(find_wallet(pool, org_id).await?.map_or(0, |w| w.balance))
}

/// True when the organization has a wallet holding at least `required` credits.
pub async fn check_credits(pool: &DbPool, org_id: Uuid, required: i64) -> Result<bool, AppError> {
    Ok(find_wallet(pool, org_id)
        .await?
        .is_some_and(|w| w.balance >= required))
}

/// Fail with `InsufficientCredits` unless the wallet covers `required`.
pub async fn ensure_credits(pool: &DbPool, org_id: Uuid, required: i64) -> Result<(), AppError> {
    let available = balance(pool, org_id).await?;
    if available < required {
        return Err(AppError::InsufficientCredits {
            required,
            available,
        });
    }
    Ok(())
}

/// Deduct `amount` credits for usage, in its own transaction.
///
/// See [`deduct_credits_in`].
pub async fn deduct_credits(
    pool: &DbPool,
    org_id: Uuid,
    amount: i64,
    reason: &str,
    ref_id: Option<String>,
    metadata: Value,
) -> Result<CreditTxn, AppError> {
    let mut tx = pool.begin().await?;
    let txn = deduct_credits_in(&mut tx, org_id, amount, reason, ref_id, metadata).await?;
    tx.commit().await?;
    Ok(txn)
}

/// Deduct `amount` credits inside the caller's transaction.
///
/// # Process
///
/// 1. Lock the wallet row (`FOR UPDATE`)
/// 2. Check the balance covers the amount
/// 3. Decrement balance, increment lifetime_spent
/// 4. Append a `USAGE` ledger row with delta `-amount`
///
/// `reason` is a human-readable description stored in the metadata next to `metadata`'s
/// own keys.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `NotFound`: the organization has no wallet
/// - `InsufficientCredits`: balance lower than amount (nothing is written)
pub async fn deduct_credits_in(
    conn: &mut PgConnection,
    org_id: Uuid,
    amount: i64,
    reason: &str,
    ref_id: Option<String>,
    metadata: Value,
) -> Result<CreditTxn, AppError> {
    if amount <= 0 {
        return Err(AppError::invalid("Amount must be positive"));
    }

    let available: i64 =
        sqlx::query_scalar("SELECT balance FROM credit_wallets WHERE org_id = $1 FOR UPDATE")
            .bind(org_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::not_found("Wallet"))?;

    if available < amount {
        return Err(AppError::InsufficientCredits {
            required: amount,
            available,
        });
    }

    sqlx::query(
        r#"
        UPDATE credit_wallets
        SET balance = balance - $1,
            lifetime_spent = lifetime_spent + $1,
            updated_at = NOW()
        WHERE org_id = $2
        "#,
    )
    .bind(amount)
    .bind(org_id)
    .execute(&mut *conn)
    .await?;

    let txn = sqlx::query_as::<_, CreditTxn>(
        r#"
        INSERT INTO credit_txns (org_id, delta, reason, ref_id, metadata)
        VALUES ($1, $2, 'USAGE', $3, $4)
        RETURNING *
        "#,
    )
    .bind(org_id)
    .bind(-amount)
    .bind(ref_id)
    .bind(usage_metadata(reason, metadata))
    .fetch_one(&mut *conn)
    .await?;

    tracing::info!(%org_id, amount, reason, "credits deducted");

    Ok(txn)
}

/// Merge the usage description into caller metadata.
fn usage_metadata(reason: &str, metadata: Value) -> Value {
    let mut merged = json!({ "reason": reason });
    if let (Some(target), Value::Object(extra)) = (merged.as_object_mut(), metadata) {
        for (key, value) in extra {
            target.insert(key, value);
        }
    }
    merged
}

/// Add `amount` credits to a wallet, in its own transaction.
pub async fn add_credits(
    pool: &DbPool,
    org_id: Uuid,
    amount: i64,
    reason: CreditReason,
    ref_id: Option<String>,
    metadata: Option<Value>,
) -> Result<CreditTxn, AppError> {
    let mut tx = pool.begin().await?;
    let txn = add_credits_in(&mut tx, org_id, amount, reason, ref_id, metadata).await?;
    tx.commit().await?;
    Ok(txn)
}

/// Add `amount` credits inside the caller's transaction.
///
/// Creates the wallet if it does not exist yet, then appends a ledger row with delta
/// `+amount`.
///
/// # Errors
///
/// - `InvalidRequest`: amount is zero or negative
/// - `Conflict`: a purchase with the same `ref_id` was already credited
pub async fn add_credits_in(
    conn: &mut PgConnection,
    org_id: Uuid,
    amount: i64,
    reason: CreditReason,
    ref_id: Option<String>,
    metadata: Option<Value>,
) -> Result<CreditTxn, AppError> {
    if amount <= 0 {
        return Err(AppError::invalid("Amount must be positive"));
    }

    // Ledger row first: a duplicate purchase fails here before the balance moves
    let txn = sqlx::query_as::<_, CreditTxn>(
        r#"
        INSERT INTO credit_txns (org_id, delta, reason, ref_id, metadata)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(org_id)
    .bind(amount)
    .bind(reason.as_str())
    .bind(ref_id)
    .bind(metadata)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Credits for this reference were already added".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    sqlx::query(
        r#"
        INSERT INTO credit_wallets (org_id, balance, lifetime_spent)
        VALUES ($1, $2, 0)
        ON CONFLICT (org_id)
        DO UPDATE SET balance = credit_wallets.balance + EXCLUDED.balance, updated_at = NOW()
        "#,
    )
    .bind(org_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?;

    tracing::info!(%org_id, amount, reason = reason.as_str(), "credits added");

    Ok(txn)
}

/// Ledger page for an organization, newest first, with the total row count.
pub async fn list_transactions(
    pool: &DbPool,
    org_id: Uuid,
    paging: &PageParams,
) -> Result<(Vec<CreditTxn>, i64), AppError> {
    let txns = sqlx::query_as::<_, CreditTxn>(
        r#"
        SELECT * FROM credit_txns
        WHERE org_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(org_id)
    .bind(paging.page_size())
    .bind(paging.offset())
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credit_txns WHERE org_id = $1")
        .bind(org_id)
        .fetch_one(pool)
        .await?;

    Ok((txns, total))
}

/// Active credit packages, cheapest first.
pub async fn list_packages(pool: &DbPool) -> Result<Vec<CreditPackage>, AppError> {
    let packages = sqlx::query_as::<_, CreditPackage>(
        "SELECT * FROM credit_packages WHERE is_active = true ORDER BY price_cents ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(packages)
}

pub async fn find_package(pool: &DbPool, package_id: Uuid) -> Result<CreditPackage, AppError> {
    sqlx::query_as::<_, CreditPackage>(
        "SELECT * FROM credit_packages WHERE id = $1 AND is_active = true",
    )
    .bind(package_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Credit package"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn draft_units_round_up_per_thousand_words() {
        assert_eq!(draft_units(1500), 2);
        assert_eq!(draft_units(1000), 1);
        assert_eq!(draft_units(1001), 2);
        assert_eq!(draft_units(0), 0);
        assert_eq!(draft_units(-5), 0);
    }

    #[test]
    fn usage_metadata_keeps_reason_and_caller_keys() {
        let merged = usage_metadata(
            "Draft generation",
            json!({ "draft_id": "d1", "word_count": 1200 }),
        );
        assert_eq!(
            merged,
            json!({ "reason": "Draft generation", "draft_id": "d1", "word_count": 1200 })
        );
    }

    #[test]
    fn usage_metadata_ignores_non_object_extras() {
        assert_eq!(
            usage_metadata("Export", Value::Null),
            json!({ "reason": "Export" })
        );
    }
}
