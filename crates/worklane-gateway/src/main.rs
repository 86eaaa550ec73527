use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;
use worklane_core::{
    Actor, ContractorCredential, LifecycleError, Role, TriggerKind, WorkItemKind, WorkItemStatus,
    lifecycle,
};
use worklane_finance::{
    BulkSelector, FinanceError, HttpProcessorClient, ProcessorClient,
    store::{self, WORK_ITEM_COLUMNS},
};
use worklane_platform::{
    ApproveRequest, ApproveResponse, AssignContractorRequest, AssignContractorResponse,
    BulkApproveRequest, BulkApproveResponse,
    ContractorActionQuery, ContractorActionRequest, CreateWorkItemRequest, CreateWorkItemResponse,
    DeleteWorkItemRequest, EventBus, FailedPaymentView, ListFailedPaymentsResponse,
    ProcessorConfig, RequestRevisionRequest, RequestRevisionResponse, RetryPaymentRequest,
    ServiceConfig, SetBudgetCapRequest, SetBudgetCapResponse, SubmitWorkRequest,
    SubmitWorkResponse, WorkItemStatusResponse, WorkItemView, connect_database,
};

const SIGNATURE_HEADER: &str = "processor-signature";
const DEFAULT_TOKEN_VALID_DAYS: i64 = 14;

#[derive(Clone)]
struct AppState {
    pool: PgPool,
    bus: EventBus,
    processor: Arc<dyn ProcessorClient>,
    webhook_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ListFailedPaymentsQuery {
    business_id: Option<Uuid>,
    limit: Option<i64>,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "worklane_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let processor_config = ProcessorConfig::from_env()?;
    let pool = connect_database(&config.database_url).await?;
    let bus = EventBus::connect(&config.redis_url)?;
    let processor: Arc<dyn ProcessorClient> =
        Arc::new(HttpProcessorClient::new(&processor_config)?);

    let state = AppState {
        pool,
        bus,
        processor,
        webhook_secret: processor_config.webhook_secret,
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/work-items", post(create_work_item))
        .route("/work-items/{work_item_id}", get(get_work_item))
        .route("/work-items/{work_item_id}", delete(delete_work_item))
        .route("/work-items/{work_item_id}/assign", post(assign_contractor))
        .route("/work-items/{work_item_id}/accept", post(accept_work_item))
        .route("/work-items/{work_item_id}/decline", post(decline_work_item))
        .route("/work-items/{work_item_id}/submit", post(submit_work))
        .route("/work-items/{work_item_id}/approve", post(approve_work_item))
        .route(
            "/work-items/{work_item_id}/request-revision",
            post(request_revision),
        )
        .route("/submissions/bulk-approve", post(bulk_approve))
        .route("/budget", put(set_budget_cap))
        .route("/payments/failed", get(list_failed_payments))
        .route("/payments/{payment_id}/retry", post(retry_payment))
        .route("/webhooks/processor", post(processor_webhook))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn create_work_item(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkItemRequest>,
) -> Result<Json<CreateWorkItemResponse>, (StatusCode, String)> {
    let kind = WorkItemKind::parse(&payload.kind).map_err(invalid_request)?;
    let currency = normalize_currency(&payload.currency).map_err(invalid_request)?;
    if payload.amount < Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            "amount must be non-negative".to_string(),
        ));
    }
    let description = payload.description.trim().to_string();
    if description.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "description is required".to_string(),
        ));
    }

    let work_item_id = Uuid::new_v4();
    let now = Utc::now();

    let (status, access_token, token_expires_at) = if payload.contractor_id.is_some() {
        let valid_days = payload
            .token_valid_days
            .unwrap_or(DEFAULT_TOKEN_VALID_DAYS)
            .clamp(1, 90);
        (
            WorkItemStatus::Pending,
            Some(mint_access_token()),
            Some(now + Duration::days(valid_days)),
        )
    } else {
        (WorkItemStatus::Draft, None, None)
    };

    sqlx::query(
        r#"
        INSERT INTO work_items (
            id, business_id, contractor_id, kind, amount, currency, status,
            due_date, description, artifact_refs, access_token,
            token_expires_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, '[]'::jsonb, $10, $11, $12, $12)
        "#,
    )
    .bind(work_item_id)
    .bind(payload.business_id)
    .bind(payload.contractor_id)
    .bind(kind.as_str())
    .bind(payload.amount)
    .bind(&currency)
    .bind(status.as_str())
    .bind(payload.due_date)
    .bind(&description)
    .bind(access_token.as_deref())
    .bind(token_expires_at)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(internal_error)?;

    if let Some(contractor_id) = payload.contractor_id {
        state
            .bus
            .notify(
                contractor_id,
                "WORK_OFFERED",
                &format!("You have been offered {kind_label}: {description}", kind_label = kind.as_str()),
                work_item_id,
            )
            .await;
    }

    Ok(Json(CreateWorkItemResponse {
        work_item_id,
        status: status.as_str().to_string(),
        access_token,
        token_expires_at,
        created_at: now,
    }))
}

async fn get_work_item(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
) -> Result<Json<WorkItemView>, (StatusCode, String)> {
    let row = sqlx::query(&format!(
        "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE id = $1"
    ))
    .bind(work_item_id)
    .fetch_optional(&state.pool)
    .await
    .map_err(internal_error)?;

    let Some(row) = row else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("work item {work_item_id} not found"),
        ));
    };
    let item = store::work_item_from_row(&row).map_err(internal_error)?;

    Ok(Json(WorkItemView {
        work_item_id: item.id,
        business_id: item.business_id,
        contractor_id: item.contractor_id,
        kind: item.kind.as_str().to_string(),
        amount: item.amount,
        currency: item.currency,
        status: item.status.as_str().to_string(),
        due_date: item.due_date,
        description: item.description,
        artifact_refs: item.artifact_refs,
        submitted_at: item.submitted_at,
        approved_at: item.approved_at,
        rejected_at: item.rejected_at,
        rejection_notes: item.rejection_notes,
        created_at: item.created_at,
        updated_at: item.updated_at,
    }))
}

async fn assign_contractor(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Json(payload): Json<AssignContractorRequest>,
) -> Result<Json<AssignContractorResponse>, (StatusCode, String)> {
    let owner = Actor {
        user_id: payload.business_id,
        role: Role::Business,
    };
    let valid_days = payload
        .token_valid_days
        .unwrap_or(DEFAULT_TOKEN_VALID_DAYS)
        .clamp(1, 90);
    let now = Utc::now();
    let access_token = mint_access_token();
    let token_expires_at = now + Duration::days(valid_days);

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    lifecycle::assign(
        &mut item,
        owner,
        payload.contractor_id,
        access_token.clone(),
        token_expires_at,
        now,
    )
    .map_err(lifecycle_error)?;
    store::persist_work_item(&mut tx, &item)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    state
        .bus
        .notify(
            payload.contractor_id,
            "WORK_OFFERED",
            &format!("You have been offered work: {}", item.description),
            work_item_id,
        )
        .await;

    Ok(Json(AssignContractorResponse {
        work_item_id,
        status: item.status.as_str().to_string(),
        access_token,
        token_expires_at,
    }))
}

async fn accept_work_item(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Query(query): Query<ContractorActionQuery>,
    Json(payload): Json<ContractorActionRequest>,
) -> Result<Json<WorkItemStatusResponse>, (StatusCode, String)> {
    let credential = contractor_credential(&query, &payload)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    lifecycle::accept(&mut item, &credential, now).map_err(lifecycle_error)?;
    store::persist_work_item(&mut tx, &item)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    state
        .bus
        .notify(
            item.business_id,
            "WORK_ACCEPTED",
            "Your work item was accepted by the contractor",
            work_item_id,
        )
        .await;

    Ok(Json(WorkItemStatusResponse {
        work_item_id,
        status: item.status.as_str().to_string(),
    }))
}

async fn decline_work_item(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Query(query): Query<ContractorActionQuery>,
    Json(payload): Json<ContractorActionRequest>,
) -> Result<Json<WorkItemStatusResponse>, (StatusCode, String)> {
    let credential = contractor_credential(&query, &payload)?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    lifecycle::decline(&mut item, &credential, now).map_err(lifecycle_error)?;
    store::persist_work_item(&mut tx, &item)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    state
        .bus
        .notify(
            item.business_id,
            "WORK_DECLINED",
            "Your work item was declined by the contractor",
            work_item_id,
        )
        .await;

    Ok(Json(WorkItemStatusResponse {
        work_item_id,
        status: item.status.as_str().to_string(),
    }))
}

async fn submit_work(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Query(query): Query<ContractorActionQuery>,
    Json(payload): Json<SubmitWorkRequest>,
) -> Result<Json<SubmitWorkResponse>, (StatusCode, String)> {
    let credential = contractor_credential(
        &query,
        &ContractorActionRequest {
            contractor_id: payload.contractor_id,
        },
    )?;
    let now = Utc::now();

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    let latest_version: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) FROM submissions WHERE work_item_id = $1",
    )
    .bind(work_item_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(internal_error)?;

    let version = lifecycle::submit(
        &mut item,
        &credential,
        &payload.artifact_refs,
        latest_version,
        now,
    )
    .map_err(lifecycle_error)?;

    let submitted_by = item
        .contractor_id
        .ok_or_else(|| internal_error("submitted item lost its contractor"))?;
    let submission_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO submissions (
            id, work_item_id, version, submitted_by, description,
            artifact_refs, status, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'SUBMITTED', $7)
        "#,
    )
    .bind(submission_id)
    .bind(work_item_id)
    .bind(version)
    .bind(submitted_by)
    .bind(payload.description.trim())
    .bind(serde_json::to_value(&payload.artifact_refs).map_err(internal_error)?)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(internal_error)?;

    store::persist_work_item(&mut tx, &item)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    state
        .bus
        .notify(
            item.business_id,
            "WORK_SUBMITTED",
            &format!("Submission v{version} is ready for review"),
            work_item_id,
        )
        .await;

    Ok(Json(SubmitWorkResponse {
        work_item_id,
        submission_id,
        version,
        status: item.status.as_str().to_string(),
    }))
}

async fn approve_work_item(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Json(payload): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, (StatusCode, String)> {
    let approver = Actor {
        user_id: payload.approver_id,
        role: Role::Business,
    };
    let now = Utc::now();

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    let outcome = lifecycle::approve(&mut item, approver, now).map_err(lifecycle_error)?;

    let already_approved = outcome == lifecycle::ApprovalOutcome::AlreadyApproved;
    if !already_approved {
        store::persist_work_item(&mut tx, &item)
            .await
            .map_err(internal_error)?;
        sqlx::query(
            "UPDATE submissions \
             SET status = 'APPROVED', reviewed_by = $2, review_notes = $3, reviewed_at = $4 \
             WHERE work_item_id = $1 AND status = 'SUBMITTED' \
               AND version = (SELECT MAX(version) FROM submissions WHERE work_item_id = $1)",
        )
        .bind(work_item_id)
        .bind(payload.approver_id)
        .bind(payload.feedback.as_deref())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(internal_error)?;
    }
    tx.commit().await.map_err(internal_error)?;

    // A repeated approval returns the existing payment outcome; it never
    // re-enters the orchestrator.
    let payment = if already_approved {
        store::latest_payment_summary(&state.pool, work_item_id)
            .await
            .map_err(internal_error)?
    } else {
        match worklane_finance::authorize_payment(
            &state.pool,
            state.processor.as_ref(),
            work_item_id,
            payload.approver_id,
            TriggerKind::Approval,
        )
        .await
        {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!("payment authorization for {work_item_id} errored: {err}");
                store::latest_payment_summary(&state.pool, work_item_id)
                    .await
                    .map_err(internal_error)?
            }
        }
    };

    if !already_approved {
        if let Some(contractor_id) = item.contractor_id {
            state
                .bus
                .notify(
                    contractor_id,
                    "WORK_APPROVED",
                    "Your submission was approved",
                    work_item_id,
                )
                .await;
        }
    }

    let status: String = sqlx::query_scalar("SELECT status FROM work_items WHERE id = $1")
        .bind(work_item_id)
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    Ok(Json(ApproveResponse {
        work_item_id,
        status,
        already_approved,
        payment,
    }))
}

async fn request_revision(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Json(payload): Json<RequestRevisionRequest>,
) -> Result<Json<RequestRevisionResponse>, (StatusCode, String)> {
    let notes = payload.notes.trim();
    if notes.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "revision notes are required".to_string(),
        ));
    }
    let reviewer = Actor {
        user_id: payload.reviewer_id,
        role: Role::Business,
    };
    let now = Utc::now();

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    lifecycle::request_revision(&mut item, reviewer, notes, now).map_err(lifecycle_error)?;
    store::persist_work_item(&mut tx, &item)
        .await
        .map_err(internal_error)?;

    let rejected_version: i32 = sqlx::query_scalar(
        "UPDATE submissions \
         SET status = 'REJECTED', reviewed_by = $2, review_notes = $3, reviewed_at = $4 \
         WHERE work_item_id = $1 AND status = 'SUBMITTED' \
           AND version = (SELECT MAX(version) FROM submissions WHERE work_item_id = $1) \
         RETURNING version",
    )
    .bind(work_item_id)
    .bind(payload.reviewer_id)
    .bind(notes)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    if let Some(contractor_id) = item.contractor_id {
        state
            .bus
            .notify(
                contractor_id,
                "REVISION_REQUESTED",
                &format!("Revision requested: {notes}"),
                work_item_id,
            )
            .await;
    }

    Ok(Json(RequestRevisionResponse {
        work_item_id,
        status: item.status.as_str().to_string(),
        rejected_version,
    }))
}

async fn delete_work_item(
    State(state): State<AppState>,
    Path(work_item_id): Path<Uuid>,
    Json(payload): Json<DeleteWorkItemRequest>,
) -> Result<Json<WorkItemStatusResponse>, (StatusCode, String)> {
    let owner = Actor {
        user_id: payload.business_id,
        role: Role::Business,
    };
    let now = Utc::now();

    let mut tx = state.pool.begin().await.map_err(internal_error)?;
    let mut item = store::lock_work_item(&mut tx, work_item_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| not_found("work item", work_item_id))?;

    lifecycle::soft_delete(&mut item, owner, now).map_err(lifecycle_error)?;
    store::persist_work_item(&mut tx, &item)
        .await
        .map_err(internal_error)?;
    tx.commit().await.map_err(internal_error)?;

    Ok(Json(WorkItemStatusResponse {
        work_item_id,
        status: item.status.as_str().to_string(),
    }))
}

async fn bulk_approve(
    State(state): State<AppState>,
    Json(payload): Json<BulkApproveRequest>,
) -> Result<Json<BulkApproveResponse>, (StatusCode, String)> {
    let selector = match (&payload.submission_ids, payload.approve_all_pending) {
        (Some(ids), _) if !ids.is_empty() => BulkSelector::Submissions(ids.clone()),
        (_, true) => BulkSelector::AllPendingFor(payload.approver_id),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "provide submission_ids or set approve_all_pending".to_string(),
            ));
        }
    };

    let report = worklane_finance::bulk_approve(
        &state.pool,
        state.processor.as_ref(),
        selector,
        payload.approver_id,
        payload.feedback.as_deref(),
    )
    .await
    .map_err(internal_error)?;

    Ok(Json(report))
}

async fn set_budget_cap(
    State(state): State<AppState>,
    Json(payload): Json<SetBudgetCapRequest>,
) -> Result<Json<SetBudgetCapResponse>, (StatusCode, Json<Value>)> {
    match worklane_finance::set_budget_cap(&state.pool, &payload).await {
        Ok(response) => Ok(Json(response)),
        Err(FinanceError::BudgetBelowCommitment {
            requested_cap,
            committed,
            minimum_cap,
        }) => Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "error": "BUDGET_BELOW_COMMITMENT",
                "requested_cap": requested_cap,
                "committed": committed,
                "minimum_cap": minimum_cap,
            })),
        )),
        Err(FinanceError::Other(err)) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )),
        Err(err) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )),
    }
}

async fn list_failed_payments(
    State(state): State<AppState>,
    Query(query): Query<ListFailedPaymentsQuery>,
) -> Result<Json<ListFailedPaymentsResponse>, (StatusCode, String)> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);

    let rows = sqlx::query(
        r#"
        SELECT id, work_item_id, business_id, contractor_id, amount, currency,
               trigger_kind, failure_reason, scheduled_at
        FROM payments
        WHERE status = 'FAILED'
          AND ($1::uuid IS NULL OR business_id = $1)
        ORDER BY scheduled_at DESC
        LIMIT $2
        "#,
    )
    .bind(query.business_id)
    .bind(limit)
    .fetch_all(&state.pool)
    .await
    .map_err(internal_error)?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(FailedPaymentView {
            payment_id: row.try_get("id").map_err(internal_error)?,
            work_item_id: row.try_get("work_item_id").map_err(internal_error)?,
            business_id: row.try_get("business_id").map_err(internal_error)?,
            contractor_id: row.try_get("contractor_id").map_err(internal_error)?,
            amount: row.try_get("amount").map_err(internal_error)?,
            currency: row.try_get("currency").map_err(internal_error)?,
            trigger_kind: row.try_get("trigger_kind").map_err(internal_error)?,
            failure_reason: row.try_get("failure_reason").map_err(internal_error)?,
            scheduled_at: row.try_get("scheduled_at").map_err(internal_error)?,
        });
    }

    Ok(Json(ListFailedPaymentsResponse { items }))
}

async fn retry_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<RetryPaymentRequest>,
) -> Result<Json<worklane_platform::PaymentSummary>, (StatusCode, String)> {
    let row = sqlx::query("SELECT work_item_id, business_id, status FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?;

    let Some(row) = row else {
        return Err(not_found("payment", payment_id));
    };
    let business_id: Uuid = row.try_get("business_id").map_err(internal_error)?;
    if business_id != payload.requested_by {
        return Err((
            StatusCode::FORBIDDEN,
            "only the paying business may retry this payment".to_string(),
        ));
    }
    let status: String = row.try_get("status").map_err(internal_error)?;
    if status != "FAILED" {
        return Err((
            StatusCode::CONFLICT,
            format!("only failed payments can be retried, this one is {status}"),
        ));
    }
    let work_item_id: Uuid = row.try_get("work_item_id").map_err(internal_error)?;

    let summary = worklane_finance::authorize_payment(
        &state.pool,
        state.processor.as_ref(),
        work_item_id,
        payload.requested_by,
        TriggerKind::ManualRetry,
    )
    .await
    .map_err(finance_error)?;

    Ok(Json(summary))
}

async fn processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, String)> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or((
            StatusCode::BAD_REQUEST,
            "missing signature header".to_string(),
        ))?;

    match worklane_finance::handle_processor_event(
        &state.pool,
        &state.bus,
        &body,
        signature,
        &state.webhook_secret,
    )
    .await
    {
        Ok(()) => Ok("ok"),
        Err(FinanceError::InvalidSignature) => {
            warn!("rejected processor webhook with invalid signature");
            Err((
                StatusCode::BAD_REQUEST,
                "invalid signature".to_string(),
            ))
        }
        Err(err) => Err(internal_error(err)),
    }
}

fn contractor_credential(
    query: &ContractorActionQuery,
    payload: &ContractorActionRequest,
) -> Result<ContractorCredential, (StatusCode, String)> {
    if let Some(token) = query.token.as_deref() {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(ContractorCredential::Token(token.to_string()));
        }
    }
    let contractor_id = payload.contractor_id.ok_or((
        StatusCode::BAD_REQUEST,
        "contractor_id or token is required".to_string(),
    ))?;
    Ok(ContractorCredential::Actor(Actor {
        user_id: contractor_id,
        role: Role::Contractor,
    }))
}

fn mint_access_token() -> String {
    format!("wlt_{}", Uuid::new_v4().simple())
}

fn normalize_currency(value: &str) -> AnyResult<String> {
    let normalized = value.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        anyhow::bail!("currency is required");
    }
    if normalized.len() != 3 {
        anyhow::bail!("currency must be a 3-letter code");
    }
    Ok(normalized)
}

fn not_found(entity: &str, id: Uuid) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{entity} {id} not found"))
}

fn lifecycle_error(err: LifecycleError) -> (StatusCode, String) {
    let status = match err {
        LifecycleError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
        LifecycleError::AccessDenied(_) => StatusCode::FORBIDDEN,
        LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
        LifecycleError::MissingArtifacts
        | LifecycleError::ContractorUnbound
        | LifecycleError::StaleSubmission { .. } => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

fn finance_error(err: FinanceError) -> (StatusCode, String) {
    match err {
        FinanceError::Lifecycle(inner) => lifecycle_error(inner),
        FinanceError::InvalidSignature => (StatusCode::BAD_REQUEST, err.to_string()),
        FinanceError::BudgetBelowCommitment { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        FinanceError::PaymentProcessor(_) | FinanceError::Storage(_) | FinanceError::Other(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn invalid_request(err: anyhow::Error) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn internal_error<E: std::fmt::Display>(err: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}
