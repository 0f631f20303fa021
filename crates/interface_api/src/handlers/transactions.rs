//! Transaction handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::TransactionId;
use domain_savings::{SavingsTransaction, TransferReceipt};

use super::validated;
use crate::dto::accounts::{ReverseBody, TransactionStatusBody, TransferBody};
use crate::{error::ApiError, AppState};

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SavingsTransaction>, ApiError> {
    let transaction = state
        .ledger
        .get_transaction(TransactionId::from_uuid(id))
        .await?;
    Ok(Json(transaction))
}

/// Reverses a completed posting and returns the counter-posting
pub async fn reverse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ReverseBody>>,
) -> Result<(StatusCode, Json<SavingsTransaction>), ApiError> {
    let body = validated(body.map(|Json(b)| b).unwrap_or_default())?;
    let reversal = state
        .ledger
        .reverse(TransactionId::from_uuid(id), body.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(reversal)))
}

/// Completes or fails a pending posting
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<TransactionStatusBody>,
) -> Result<Json<SavingsTransaction>, ApiError> {
    let transaction = state
        .ledger
        .set_transaction_status(TransactionId::from_uuid(id), body.status)
        .await?;
    Ok(Json(transaction))
}

pub async fn transfer(
    State(state): State<AppState>,
    Json(body): Json<TransferBody>,
) -> Result<(StatusCode, Json<TransferReceipt>), ApiError> {
    let body = validated(body)?;
    let receipt = state.ledger.transfer(body.into()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
