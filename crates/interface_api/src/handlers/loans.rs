//! Loan handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use core_kernel::{LoanId, Money};
use domain_loan::{
    GuarantorRequest, Loan, LoanGuarantor, LoanRepayment, RepaymentReceipt, ScheduleEntry,
};

use super::validated;
use crate::dto::loans::*;
use crate::{error::ApiError, AppState};

fn respond(state: &AppState, loan: Loan) -> Json<LoanResponse> {
    Json(LoanResponse::new(loan, state.clock.today()))
}

/// Submits a loan application; the schedule figures are quoted on the response
pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitLoanBody>,
) -> Result<(StatusCode, Json<LoanResponse>), ApiError> {
    let body = validated(body)?;
    let loan = state.loans.submit(body.into()).await?;
    Ok((StatusCode::CREATED, respond(&state, loan)))
}

pub async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = state.loans.get_loan(LoanId::from_uuid(id)).await?;
    Ok(respond(&state, loan))
}

pub async fn list_guarantors(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LoanGuarantor>>, ApiError> {
    let guarantors = state.loans.list_guarantors(LoanId::from_uuid(id)).await?;
    Ok(Json(guarantors))
}

/// Registers a guarantor after the exposure check
pub async fn add_guarantor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<GuarantorBody>,
) -> Result<(StatusCode, Json<LoanGuarantor>), ApiError> {
    let request = GuarantorRequest::try_from(body)?;
    let guarantor = state
        .loans
        .add_guarantor(LoanId::from_uuid(id), request)
        .await?;
    Ok((StatusCode::CREATED, Json(guarantor)))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanActionResponse>, ApiError> {
    let loan = state.loans.approve(LoanId::from_uuid(id)).await?;
    Ok(action(loan))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<LoanActionResponse>, ApiError> {
    let body = validated(body.map(|Json(b)| b).unwrap_or_default())?;
    let loan = state.loans.reject(LoanId::from_uuid(id), body.reason).await?;
    Ok(action(loan))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ReasonBody>>,
) -> Result<Json<LoanActionResponse>, ApiError> {
    let body = validated(body.map(|Json(b)| b).unwrap_or_default())?;
    let loan = state.loans.cancel(LoanId::from_uuid(id), body.reason).await?;
    Ok(action(loan))
}

/// Credits the principal to the disbursement account and activates the loan
pub async fn disburse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = state.loans.disburse(LoanId::from_uuid(id)).await?;
    Ok(respond(&state, loan))
}

pub async fn list_repayments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LoanRepayment>>, ApiError> {
    let repayments = state.loans.list_repayments(LoanId::from_uuid(id)).await?;
    Ok(Json(repayments))
}

/// Records a repayment; a replayed reference answers 200 with the original
pub async fn record_repayment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<RepaymentBody>,
) -> Result<(StatusCode, Json<RepaymentReceipt>), ApiError> {
    let body = validated(body)?;
    let source = body.source()?;
    let receipt = state
        .loans
        .record_repayment(LoanId::from_uuid(id), source, Money::new(body.amount))
        .await?;

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(receipt)))
}

pub async fn mark_defaulted(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanActionResponse>, ApiError> {
    let loan = state.loans.mark_defaulted(LoanId::from_uuid(id)).await?;
    Ok(action(loan))
}

pub async fn schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ScheduleEntry>>, ApiError> {
    let entries = state.loans.repayment_schedule(LoanId::from_uuid(id)).await?;
    Ok(Json(entries))
}

fn action(loan: Loan) -> Json<LoanActionResponse> {
    Json(LoanActionResponse {
        loan_id: loan.id,
        status: loan.status,
    })
}
