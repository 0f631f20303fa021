//! Member handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use core_kernel::{MemberId, Money};
use domain_loan::ExposureDecision;

use crate::dto::loans::CapacityQuery;
use crate::{error::ApiError, AppState};

/// Advisory answer to whether a member could guarantee `amount` more
pub async fn guarantee_capacity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CapacityQuery>,
) -> Result<Json<ExposureDecision>, ApiError> {
    let decision = state
        .loans
        .can_guarantee(MemberId::from_uuid(id), Money::new(query.amount))
        .await?;
    Ok(Json(decision))
}
