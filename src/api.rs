//! Axum REST handlers — a thin invocation surface over the core engine.
//!
//! No business logic lives here: handlers decode, call into the engine, and
//! map the error taxonomy onto status codes.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::distribution::Distributor;
use crate::errors::EngineError;
use crate::ledger;
use crate::models::{ActivityKind, BoostKind, ParticipantStats};
use crate::ranking::{self, RankInfo};
use crate::scheduler::{self, LiveSchedulerState, TickSummary};
use crate::scoring;
use crate::validator;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<LiveSchedulerState>,
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ActivityRequest {
    pub participant_id: i64,
    pub kind: String,
    pub text: Option<String>,
}

#[derive(Serialize)]
pub struct ActivityResponse {
    pub points_awarded: i64,
}

#[derive(Deserialize)]
pub struct BoostRequest {
    pub participant_id: i64,
    pub kind: String,
    pub price_units: i64,
}

#[derive(Serialize)]
pub struct BoostResponse {
    pub multiplier: f64,
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub contest_id: i64,
    pub count: usize,
    pub entries: Vec<ParticipantStats>,
}

#[derive(Serialize)]
pub struct PoolResponse {
    pub gift_id: String,
    pub availability: i64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(e: EngineError) -> axum::response::Response {
    let status = match &e {
        EngineError::ContestNotFound(_) | EngineError::DistributionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        e if e.is_precondition() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /contests/:id/activity`
///
/// Comments and replies pass the quality gate before they can earn points.
pub async fn post_activity(
    State(state): State<Arc<ApiState>>,
    Path(contest_id): Path<i64>,
    Json(req): Json<ActivityRequest>,
) -> impl IntoResponse {
    let Some(kind) = ActivityKind::parse(&req.kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("unknown activity kind '{}'", req.kind),
            }),
        )
            .into_response();
    };

    if matches!(kind, ActivityKind::Comment | ActivityKind::Reply) {
        if let Some(text) = &req.text {
            let verdict = validator::validate_comment(text);
            if !verdict.valid {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(ErrorResponse {
                        error: format!(
                            "comment rejected: {}",
                            verdict.reason.unwrap_or("invalid")
                        ),
                    }),
                )
                    .into_response();
            }
        }
    }

    match scoring::apply_activity(&state.engine.pool, contest_id, req.participant_id, kind).await {
        Ok(points_awarded) => Json(ActivityResponse { points_awarded }).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /contests/:id/boost`
pub async fn post_boost(
    State(state): State<Arc<ApiState>>,
    Path(contest_id): Path<i64>,
    Json(req): Json<BoostRequest>,
) -> impl IntoResponse {
    let Some(kind) = BoostKind::parse(&req.kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("unknown boost kind '{}'", req.kind),
            }),
        )
            .into_response();
    };

    match scoring::apply_boost(
        &state.engine.pool,
        contest_id,
        req.participant_id,
        kind,
        req.price_units,
    )
    .await
    {
        Ok(multiplier) => Json(BoostResponse { multiplier }).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /contests/:id/leaderboard`
pub async fn get_leaderboard(
    State(state): State<Arc<ApiState>>,
    Path(contest_id): Path<i64>,
    Query(q): Query<LeaderboardQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    match ranking::leaderboard(&state.engine.pool, contest_id, limit, offset).await {
        Ok(entries) => Json(LeaderboardResponse {
            contest_id,
            count: entries.len(),
            entries,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /contests/:id/position/:participant_id`
pub async fn get_position(
    State(state): State<Arc<ApiState>>,
    Path((contest_id, participant_id)): Path<(i64, i64)>,
) -> impl IntoResponse {
    match ranking::position_of(&state.engine.pool, contest_id, participant_id).await {
        Ok(Some(info)) => Json::<RankInfo>(info).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "participant has no activity in this contest".to_string(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /scheduler/tick`
///
/// Manual tick for recovery and testing; idempotent against the scheduled
/// one.
pub async fn post_tick(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match scheduler::run_tick(state.engine.as_ref()).await {
        Ok(summary) => Json::<TickSummary>(summary).into_response(),
        Err(e) => error_response(e),
    }
}

/// `POST /distributions/:id/retry`
pub async fn post_retry(
    State(state): State<Arc<ApiState>>,
    Path(distribution_id): Path<i64>,
) -> impl IntoResponse {
    let engine = &state.engine;
    let distributor = Distributor::new(
        &engine.pool,
        &engine.gifts,
        &engine.chain,
        engine.config.send_pacing_ms,
    );
    match distributor.retry(distribution_id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => error_response(e),
    }
}

/// `GET /pool/:gift_id`
pub async fn get_pool(
    State(state): State<Arc<ApiState>>,
    Path(gift_id): Path<String>,
) -> impl IntoResponse {
    match ledger::availability(&state.engine.pool, &gift_id).await {
        Ok(availability) => Json(PoolResponse {
            gift_id,
            availability,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}
