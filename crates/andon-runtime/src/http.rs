//! REST handlers.
//!
//! Errors from the core map onto HTTP statuses through
//! `RelayError::http_status()`, with `RelayError::to_json()` as the body.

use crate::AppState;
use andon_relay::{
    AlarmId, AndonAlarm, AndonApi, FanoutApi, NewAlarm, PublishReport, RelayError,
    RelayMetricsSnapshot, TopicKey, UserId,
};
use andon_telemetry::{
    log_alarm_event, metric_inc, time_histogram, RelaySample, HTTP_REQUESTS,
    HTTP_REQUEST_DURATION,
};
use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

/// Core error carried to the HTTP edge.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "Request failed");
        }

        let mut response = (status, Json(self.0.to_json())).into_response();
        if let RelayError::RateLimited { retry_after, .. } = &self.0 {
            let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_alarm_id(raw: &str) -> ApiResult<AlarmId> {
    AlarmId::parse(raw)
        .map_err(|_| ApiError(RelayError::Validation(format!("invalid alarm id: {raw}"))))
}

/// Count and time every routed request.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = {
        let _timer = time_histogram!(HTTP_REQUEST_DURATION.with_label_values(&[route.as_str()]));
        next.run(req).await
    };

    metric_inc!(HTTP_REQUESTS, &[route.as_str(), response.status().as_str()]);
    response
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connections": state.relay.connection_count(),
        "pendingTimers": state.andon.scheduler().active_count(),
    }))
}

pub async fn stats(State(state): State<AppState>) -> Json<RelayMetricsSnapshot> {
    Json(state.relay.metrics_snapshot())
}

/// Prometheus scrape. Gauges are refreshed from the live snapshot first.
pub async fn metrics(State(state): State<AppState>) -> Response {
    let snapshot = state.relay.metrics_snapshot();
    let active_alarms = match state.andon.list_active().await {
        Ok(alarms) => alarms.len(),
        Err(e) => return ApiError(e).into_response(),
    };
    andon_telemetry::record_relay_sample(&sample_from(
        &snapshot,
        active_alarms,
        state.andon.scheduler().active_count(),
    ));

    match andon_telemetry::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub(crate) fn sample_from(
    snapshot: &RelayMetricsSnapshot,
    active_alarms: usize,
    pending_timers: usize,
) -> RelaySample {
    RelaySample {
        connections: snapshot.total_connections,
        subscriptions: snapshot.total_subscriptions,
        topic_kinds: snapshot
            .per_topic_kind_counts
            .iter()
            .map(|(kind, count)| (kind.as_str().to_string(), *count))
            .collect(),
        average_health: snapshot.average_health_score,
        messages_sent: snapshot.total_messages_sent,
        bytes_sent: snapshot.total_bytes_sent,
        delivery_errors: snapshot.total_errors,
        rate_limited: snapshot.rate_limited,
        flushes: snapshot.flushes,
        evictions: snapshot.evictions,
        escalations: snapshot.escalations_fired,
        active_alarms,
        pending_timers,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub topics: Vec<TopicKey>,
}

pub async fn publish(
    State(state): State<AppState>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<Json<PublishReport>> {
    if request.event_type.trim().is_empty() {
        return Err(RelayError::Validation("eventType must not be empty".into()).into());
    }
    if request.topics.is_empty() {
        return Err(RelayError::Validation("at least one topic is required".into()).into());
    }
    let report = state
        .relay
        .publish(&request.event_type, request.payload, &request.topics)
        .await;
    Ok(Json(report))
}

pub async fn report_alarm(
    State(state): State<AppState>,
    Json(alarm): Json<NewAlarm>,
) -> ApiResult<(StatusCode, Json<AndonAlarm>)> {
    let alarm = state.andon.report(alarm).await?;
    log_alarm_event!(
        info,
        "http",
        "Alarm reported",
        alarm.id,
        line = %alarm.line,
        priority = %alarm.priority
    );
    Ok((StatusCode::CREATED, Json(alarm)))
}

pub async fn list_alarms(State(state): State<AppState>) -> ApiResult<Json<Vec<AndonAlarm>>> {
    Ok(Json(state.andon.list_active().await?))
}

pub async fn get_alarm(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AndonAlarm>> {
    let id = parse_alarm_id(&id)?;
    Ok(Json(state.andon.get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AcknowledgeRequest {
    pub user: UserId,
}

pub async fn acknowledge_alarm(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AcknowledgeRequest>,
) -> ApiResult<Json<AndonAlarm>> {
    let id = parse_alarm_id(&id)?;
    Ok(Json(state.andon.acknowledge(id, request.user).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub user: UserId,
    pub notes: String,
}

pub async fn resolve_alarm(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<AndonAlarm>> {
    let id = parse_alarm_id(&id)?;
    Ok(Json(
        state.andon.resolve(id, request.user, request.notes).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalateRequest {
    pub user: UserId,
    #[serde(default)]
    pub target_level: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn escalate_alarm(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EscalateRequest>,
) -> ApiResult<Json<AndonAlarm>> {
    let id = parse_alarm_id(&id)?;
    let alarm = state
        .andon
        .escalate(id, request.user, request.target_level, request.notes)
        .await?;
    log_alarm_event!(
        info,
        "http",
        "Alarm escalated on request",
        alarm.id,
        level = alarm.escalation_level
    );
    Ok(Json(alarm))
}
