//! Savings account handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use core_kernel::SavingsAccountId;
use domain_savings::{AccountStatement, SavingsAccount, SavingsTransaction};

use super::validated;
use crate::dto::accounts::*;
use crate::{error::ApiError, AppState};

/// Opens an account, posting any opening balance
pub async fn open_account(
    State(state): State<AppState>,
    Json(body): Json<OpenAccountBody>,
) -> Result<(StatusCode, Json<SavingsAccount>), ApiError> {
    let body = validated(body)?;
    let account = state.ledger.open_account(body.into()).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SavingsAccount>, ApiError> {
    let account = state
        .ledger
        .get_account(SavingsAccountId::from_uuid(id))
        .await?;
    Ok(Json(account))
}

/// Closes an account; `closed` is false when the account still holds money,
/// has pending postings or is already closed
pub async fn close_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CloseAccountResponse>, ApiError> {
    let account_id = SavingsAccountId::from_uuid(id);
    let closed = state.ledger.close_account(account_id).await?;
    Ok(Json(CloseAccountResponse { account_id, closed }))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<AccountStatusBody>,
) -> Result<Json<SavingsAccount>, ApiError> {
    let account = state
        .ledger
        .set_account_status(SavingsAccountId::from_uuid(id), body.status)
        .await?;
    Ok(Json(account))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SavingsTransaction>>, ApiError> {
    let transactions = state
        .ledger
        .list_transactions(SavingsAccountId::from_uuid(id))
        .await?;
    Ok(Json(transactions))
}

/// Posts a transaction; a replayed reference returns the original posting
pub async fn post_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<PostTransactionBody>,
) -> Result<(StatusCode, Json<SavingsTransaction>), ApiError> {
    let body = validated(body)?;
    let transaction = state
        .ledger
        .post(body.into_request(SavingsAccountId::from_uuid(id)))
        .await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn statement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(window): Query<StatementQuery>,
) -> Result<Json<AccountStatement>, ApiError> {
    let statement = state
        .ledger
        .account_statement(SavingsAccountId::from_uuid(id), window.from, window.to)
        .await?;
    Ok(Json(statement))
}

/// Credits interest for a period; 204 when the computed interest is zero
pub async fn post_interest(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<InterestBody>,
) -> Result<Response, ApiError> {
    let body = validated(body)?;
    let posted = state
        .ledger
        .post_interest(SavingsAccountId::from_uuid(id), &body.period)
        .await?;
    Ok(match posted {
        Some(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
