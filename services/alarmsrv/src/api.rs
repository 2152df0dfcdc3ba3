//! HTTP API
//!
//! Thin handlers over the alarm subsystem. Paths follow the mobile client:
//! `/api/mqtt/*` for alarm and sensor operations, `/api/sleep/*` for ratings.

use alarm_core::{
    AlarmCommander, AlarmError, AlarmStateMachine, Broker, EligibilityGate, SensorReader,
    SensorsData, SleepRatingService, SleepStore,
};
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use common::{AppError, HealthStatus, MessageResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{AlarmSrvConfig, SERVICE_NAME};

#[derive(Clone)]
pub struct AppState {
    pub machine: AlarmStateMachine,
    pub commander: AlarmCommander,
    pub gate: EligibilityGate,
    pub ratings: SleepRatingService,
    pub sensors: SensorReader,
}

impl AppState {
    pub fn new(
        broker: Arc<dyn Broker>,
        store: Arc<dyn SleepStore>,
        machine: AlarmStateMachine,
        config: &AlarmSrvConfig,
    ) -> Self {
        let topics = &config.mqtt.topics;
        let ratings = SleepRatingService::new(store);
        Self {
            commander: AlarmCommander::new(broker.clone(), &topics.alarm_time, machine.clone()),
            gate: ratings.gate().clone(),
            sensors: SensorReader::new(broker, &topics.sensors, config.sensor_timeout()),
            ratings,
            machine,
        }
    }
}

/// [`AlarmError`] rendered through the shared error envelope
#[derive(Debug)]
pub struct ApiError(AppError);

impl From<AlarmError> for ApiError {
    fn from(err: AlarmError) -> Self {
        let message = err.to_string();
        let app_error = match err {
            AlarmError::InvalidParameter { .. } => AppError::bad_request(message),
            AlarmError::NoSensorData(_) => AppError::not_found(message),
            AlarmError::NotConnected(_) => AppError::service_unavailable(message),
            AlarmError::Publish { .. }
            | AlarmError::Subscribe { .. }
            | AlarmError::RetryBudgetExhausted { .. }
            | AlarmError::Decode(_)
            | AlarmError::Database(_) => {
                error!("Request failed: {}", message);
                AppError::internal_error(message)
            },
        };
        ApiError(app_error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SetAlarmQuery {
    /// Seconds until the alarm fires; 0 cancels
    pub time: u32,
}

#[derive(Debug, Deserialize)]
pub struct RatingQuery {
    pub rating: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlarmTimeResponse {
    pub message: String,
    pub time: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlarmStatusResponse {
    pub active: bool,
    pub triggered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RatingStatusResponse {
    #[serde(rename = "canRate")]
    pub can_rate: bool,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/mqtt/set_alarm", post(set_alarm))
        .route("/api/mqtt/cancel_alarm", post(cancel_alarm))
        .route("/api/mqtt/alarm_status", get(alarm_status))
        .route("/api/mqtt/sleep_rating_status", get(sleep_rating_status))
        .route("/api/mqtt/latest", get(latest_sensor_data))
        .route("/api/sleep/sleep_quality", post(sleep_quality))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus::healthy(SERVICE_NAME))
}

pub async fn set_alarm(
    State(state): State<AppState>,
    Query(query): Query<SetAlarmQuery>,
) -> ApiResult<AlarmTimeResponse> {
    state.commander.arm(query.time).await?;
    let message = if query.time == 0 {
        "Alarm canceled"
    } else {
        "Alarm time set"
    };
    Ok(Json(AlarmTimeResponse {
        message: message.to_string(),
        time: query.time,
    }))
}

pub async fn cancel_alarm(State(state): State<AppState>) -> ApiResult<AlarmTimeResponse> {
    state.commander.cancel().await?;
    Ok(Json(AlarmTimeResponse {
        message: "Alarm canceled".to_string(),
        time: 0,
    }))
}

pub async fn alarm_status(State(state): State<AppState>) -> Json<AlarmStatusResponse> {
    let status = state.machine.snapshot();
    Json(AlarmStatusResponse {
        active: status.armed,
        triggered: status.triggered,
    })
}

pub async fn sleep_rating_status(State(state): State<AppState>) -> ApiResult<RatingStatusResponse> {
    let can_rate = state.gate.can_rate_today().await?;
    Ok(Json(RatingStatusResponse { can_rate }))
}

pub async fn latest_sensor_data(State(state): State<AppState>) -> ApiResult<SensorsData> {
    Ok(Json(state.sensors.latest().await?))
}

pub async fn sleep_quality(
    State(state): State<AppState>,
    Query(query): Query<RatingQuery>,
) -> ApiResult<MessageResponse> {
    let rating = state.ratings.submit(query.rating).await?;
    info!("Sleep quality rated {}", rating);
    Ok(Json(MessageResponse::new(
        "Sleep quality recorded successfully",
    )))
}
