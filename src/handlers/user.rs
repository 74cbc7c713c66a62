use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Datelike, Utc};

use crate::database::queries::UsageQueries;
use crate::errors::Result;
use crate::handlers::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    QuotaDetail, QuotaResponse, UsageHistoryItem, UsageHistoryQuery, UsageHistoryResponse,
    UsageSummaryWindow, UsageTotals,
};
use crate::services::quota::QuotaLedger;

pub async fn get_quota(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<QuotaResponse>> {
    let ledger = QuotaLedger::new(state.database.clone());
    let user = ledger.ensure_current_period(&user).await?;

    let now = Utc::now();
    let day_start = start_of_day(now);
    let month_start = start_of_month(now);

    let today = UsageQueries::sum_duration_since(state.database.pool(), &user.id, day_start).await?;
    let this_month =
        UsageQueries::sum_duration_since(state.database.pool(), &user.id, month_start).await?;

    let reset_at = user
        .quota_reset_at
        .unwrap_or_else(|| QuotaLedger::first_of_next_month(now));

    Ok(Json(QuotaResponse {
        plan: user.plan,
        quota: QuotaDetail {
            limit: user.quota_limit,
            used: user.quota_used,
            remaining: user.quota_remaining(),
            reset_at,
        },
        usage: UsageSummaryWindow {
            today: today.round() as i64,
            this_month: this_month.round() as i64,
        },
    }))
}

pub async fn get_usage(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<UsageHistoryQuery>,
) -> Result<Json<UsageHistoryResponse>> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, 100);
    let offset = (page - 1) * page_size;

    let entries = UsageQueries::page_for_user(
        state.database.pool(),
        &user.id,
        query.start_date,
        page_size,
        offset,
    )
    .await?;

    let (total, total_chars, total_duration) =
        UsageQueries::totals_for_user(state.database.pool(), &user.id, query.start_date).await?;

    Ok(Json(UsageHistoryResponse {
        items: entries.into_iter().map(UsageHistoryItem::from).collect(),
        summary: UsageTotals {
            total_characters: total_chars,
            total_duration: total_duration.round() as i64,
        },
        total,
        page,
        page_size,
    }))
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(
        now.date_naive().and_hms_opt(0, 0, 0).expect("midnight always valid"),
        Utc,
    )
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(
        now.date_naive()
            .with_day(1)
            .expect("day 1 always valid")
            .and_hms_opt(0, 0, 0)
            .expect("midnight always valid"),
        Utc,
    )
}
