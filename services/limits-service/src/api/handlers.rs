use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use petsflow_entitlements::{
    validate_tenant_id_format, ActionType, ActionValidation, CountError, GateError, LimitDecision,
    PackageLimits, SubscriptionRecord, SubscriptionStatus, UsageOverview,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::StoreError;
use crate::records::NewRecord;

use super::types::{
    CancelSubscriptionResponse, CreateRecordResponse, DeleteRecordResponse, ErrorResponse,
    SubscriptionRequest,
};
use super::ApiState;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn usage_overview(
    State(state): State<Arc<ApiState>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<UsageOverview> {
    ensure_tenant(&tenant_id)?;
    let overview = state
        .gate
        .usage_overview(&tenant_id)
        .await
        .map_err(usage_unavailable)?;
    Ok(Json(overview))
}

pub async fn can_perform_action(
    State(state): State<Arc<ApiState>>,
    Path((tenant_id, action)): Path<(String, String)>,
) -> ApiResult<LimitDecision> {
    ensure_tenant(&tenant_id)?;
    let action_type = parse_action(&action)?;
    let decision = state
        .gate
        .can_perform_action(&tenant_id, action_type)
        .await
        .map_err(usage_unavailable)?;
    Ok(Json(decision))
}

pub async fn validate_action(
    State(state): State<Arc<ApiState>>,
    Path((tenant_id, action)): Path<(String, String)>,
) -> ApiResult<ActionValidation> {
    ensure_tenant(&tenant_id)?;
    let action_type = parse_action(&action)?;
    Ok(Json(state.gate.validate_action(&tenant_id, action_type).await))
}

pub async fn create_record(
    State(state): State<Arc<ApiState>>,
    Path(tenant_id): Path<String>,
    Json(record): Json<NewRecord>,
) -> Result<(StatusCode, Json<CreateRecordResponse>), ApiError> {
    ensure_tenant(&tenant_id)?;
    if let Err(reason) = record.validate() {
        return Err(bad_request("invalid_record", &reason));
    }

    let action_type = record.action_type();
    let store = Arc::clone(&state.store);
    let owner = tenant_id.clone();

    let (stored, decision) = state
        .gate
        .guard_with_decision(&tenant_id, action_type, move || async move {
            store.insert_record(&owner, record).await
        })
        .await
        .map_err(|err| match err {
            GateError::LimitExceeded(decision) => limit_exceeded(&decision),
            GateError::UsageUnavailable(err) => usage_unavailable(err),
            GateError::Execution(err) => store_error(err),
        })?;

    info!(
        tenant_id = %tenant_id,
        record_id = %stored.id,
        resource = %action_type,
        near_limit = decision.is_at_soft_limit,
        "record created"
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateRecordResponse {
            record: stored,
            limit_check: decision,
        }),
    ))
}

pub async fn delete_record(
    State(state): State<Arc<ApiState>>,
    Path((tenant_id, action, record_id)): Path<(String, String, String)>,
) -> ApiResult<DeleteRecordResponse> {
    ensure_tenant(&tenant_id)?;
    let action_type = parse_action(&action)?;
    let record_id = Uuid::parse_str(&record_id)
        .map_err(|_| bad_request("invalid_record_id", "record_id must be a UUID"))?;

    let deleted = state
        .store
        .delete_record(&tenant_id, action_type, record_id)
        .await
        .map_err(store_error)?;

    if !deleted {
        return Err(not_found("record_not_found", "record not found"));
    }
    Ok(Json(DeleteRecordResponse { deleted }))
}

pub async fn get_subscription(
    State(state): State<Arc<ApiState>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<PackageLimits> {
    ensure_tenant(&tenant_id)?;
    Ok(Json(state.gate.resolver().resolve(&tenant_id).await))
}

pub async fn put_subscription(
    State(state): State<Arc<ApiState>>,
    Path(tenant_id): Path<String>,
    Json(request): Json<SubscriptionRequest>,
) -> ApiResult<SubscriptionRecord> {
    ensure_tenant(&tenant_id)?;
    if request.package_name.trim().is_empty() {
        return Err(bad_request(
            "invalid_subscription",
            "package_name cannot be empty",
        ));
    }

    let starts_at = request.starts_at.unwrap_or_else(Utc::now);
    if let Some(ends_at) = request.ends_at {
        if ends_at <= starts_at {
            return Err(bad_request(
                "invalid_subscription",
                "ends_at must be after starts_at",
            ));
        }
    }

    let record = SubscriptionRecord {
        tenant_id: tenant_id.clone(),
        package_name: request.package_name.trim().to_string(),
        max_clients: request.max_clients,
        max_pets: request.max_pets,
        max_services: request.max_services,
        max_specializations: request.max_specializations,
        status: SubscriptionStatus::Active,
        starts_at,
        ends_at: request.ends_at,
    };

    state
        .store
        .save_subscription(&record)
        .await
        .map_err(store_error)?;

    info!(
        tenant_id = %tenant_id,
        package = %record.package_name,
        ends_at = ?record.ends_at,
        "subscription updated"
    );
    Ok(Json(record))
}

pub async fn cancel_subscription(
    State(state): State<Arc<ApiState>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<CancelSubscriptionResponse> {
    ensure_tenant(&tenant_id)?;
    let cancelled = state
        .store
        .cancel_subscription(&tenant_id)
        .await
        .map_err(store_error)?;

    if !cancelled {
        return Err(not_found(
            "subscription_not_found",
            "no active subscription",
        ));
    }

    info!(tenant_id = %tenant_id, "subscription cancelled");
    Ok(Json(CancelSubscriptionResponse { cancelled }))
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "limits-service"
    })))
}

fn ensure_tenant(tenant_id: &str) -> Result<(), ApiError> {
    validate_tenant_id_format(tenant_id)
        .map_err(|err| bad_request("invalid_tenant_id", &err.to_string()))
}

fn parse_action(action: &str) -> Result<ActionType, ApiError> {
    action
        .parse()
        .map_err(|err: petsflow_entitlements::UnknownActionType| {
            bad_request("invalid_action", &err.to_string())
        })
}

fn limit_exceeded(decision: &LimitDecision) -> ApiError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: format!(
                "{} limit reached: {}/{} on package {}",
                decision.action_type,
                decision.current_count,
                decision.max_allowed,
                decision.package_name
            ),
            code: "limit_exceeded".to_string(),
            details: serde_json::to_value(decision).ok(),
        }),
    )
}

fn usage_unavailable(err: CountError) -> ApiError {
    error!(error = %err, "usage could not be verified");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "usage could not be verified".to_string(),
            code: "usage_unavailable".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}

fn store_error(err: StoreError) -> ApiError {
    match err {
        StoreError::InvalidRecord(reason) => bad_request("invalid_record", &reason),
        StoreError::NotFound(what) => not_found("not_found", &format!("{what} not found")),
        other => internal_error(other),
    }
}

fn bad_request(code: &str, message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn not_found(code: &str, message: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    error!(error = %err, "limits API internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
            code: "internal_error".to_string(),
            details: Some(serde_json::json!({ "message": err.to_string() })),
        }),
    )
}
