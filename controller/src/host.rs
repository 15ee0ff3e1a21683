use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use prostat_common::{
    config::NetworkConfig, relay_topic, ComfortMode, ComfortProfile, FanMode, OperatingMode,
    RelayCommand, RelayEngine, RuntimeConfig, Schedule, SettingsError, SettingsPreset, Staging,
    ThresholdKey, TOPIC_CMD_HOLD, TOPIC_CMD_MODE, TOPIC_CMD_SCHEDULE, TOPIC_CMD_SETPOINT,
    TOPIC_CONTROLLER_SCHEDULE_STATE, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_TEMP,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<RelayEngine>>,
    schedule: Arc<Mutex<Schedule>>,
    timezone: Arc<Mutex<String>>,
    time_synced: Arc<AtomicBool>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    schedule_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct TimezoneUpdate {
    timezone: String,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    #[serde(rename = "timeSynced")]
    time_synced: bool,
    timezone: String,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

#[derive(Debug, Serialize)]
struct NetworkConfigView {
    #[serde(rename = "mqttHost")]
    mqtt_host: String,
    #[serde(rename = "mqttPort")]
    mqtt_port: u16,
    #[serde(rename = "mqttUser")]
    mqtt_user: String,
    #[serde(rename = "mqttPassSet")]
    mqtt_pass_set: bool,
}

#[derive(Debug, Deserialize)]
struct NetworkConfigUpdate {
    #[serde(rename = "mqttHost")]
    mqtt_host: String,
    #[serde(rename = "mqttPort")]
    mqtt_port: u16,
    #[serde(rename = "mqttUser")]
    mqtt_user: String,
    #[serde(rename = "mqttPass", default)]
    mqtt_pass: Option<String>,
}

#[derive(Debug, Serialize)]
struct NetworkUpdateResponse {
    #[serde(rename = "restartRequired")]
    restart_required: bool,
    network: NetworkConfigView,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 4096;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store
        .load_runtime_config()
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load runtime config from store: {err:#}");
            RuntimeConfig::default()
        })
        .sanitized();

    let mut schedule = store.load_schedule().await.unwrap_or_else(|err| {
        warn!("failed to load schedule from store: {err:#}");
        Schedule::default()
    });
    schedule.normalize();

    let engine = RelayEngine::new(runtime.control.clone(), runtime.settings.clone());
    let tick_interval = Duration::from_millis(runtime.control.tick_interval_ms);
    let publish_interval = Duration::from_millis(runtime.control.state_publish_interval_ms);

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("prostat-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        schedule: Arc::new(Mutex::new(schedule)),
        timezone: Arc::new(Mutex::new(runtime.timezone)),
        time_synced: Arc::new(AtomicBool::new(false)),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone(), tick_interval);
    spawn_state_publish_loop(app_state.clone(), publish_interval);

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/target", post(handle_set_target))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/settings", get(handle_get_settings))
        .route("/api/settings/threshold", post(handle_set_threshold))
        .route("/api/settings/auto", post(handle_set_auto))
        .route("/api/settings/staging", post(handle_set_staging))
        .route("/api/settings/preset", post(handle_apply_preset))
        .route("/api/comfort", post(handle_set_comfort))
        .route("/api/hold/enter", post(handle_hold_enter))
        .route("/api/hold/exit", post(handle_hold_exit))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .route("/api/time", get(handle_get_time))
        .route("/api/timezone", put(handle_put_timezone))
        .route(
            "/api/network",
            get(handle_get_network).put(handle_put_network),
        )
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("PROSTAT_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_TEMP,
        TOPIC_CMD_SETPOINT,
        TOPIC_CMD_MODE,
        TOPIC_CMD_HOLD,
        TOPIC_CMD_SCHEDULE,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState, tick_interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let timezone = { app_state.timezone.lock().await.clone() };
            let now_in_tz = now_in_timezone(&timezone);
            app_state
                .time_synced
                .store(now_in_tz.is_some(), Ordering::Relaxed);

            let setpoint_moved = if let Some(now) = now_in_tz {
                let (comfort, schedule_enabled) = {
                    let schedule = app_state.schedule.lock().await;
                    (schedule.current_comfort(now), schedule.enabled)
                };
                let mut engine = app_state.engine.lock().await;
                engine.apply_schedule(comfort, schedule_enabled, now_ms)
            } else {
                false
            };

            if setpoint_moved {
                if let Err(err) = persist_runtime_from_state(&app_state).await {
                    warn!("failed to persist schedule-driven setpoint: {err:#}");
                }
            }

            evaluate_and_publish(&app_state).await;
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, publish_interval: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(publish_interval);
        loop {
            interval.tick().await;

            let now_ms = monotonic_ms();
            let payload = {
                let engine = app_state.engine.lock().await;
                serde_json::to_vec(&engine.state_payload(now_ms))
            };

            match payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }

            let schedule_payload = {
                let schedule = app_state.schedule.lock().await;
                serde_json::to_vec(&*schedule)
            };

            match schedule_payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(
                            TOPIC_CONTROLLER_SCHEDULE_STATE,
                            QoS::AtLeastOnce,
                            true,
                            body,
                        )
                        .await
                    {
                        warn!("schedule state publish failed: {err}");
                    }
                }
                Err(err) => warn!("schedule serialization failed: {err}"),
            }
        }
    });
}

/// Single decision entry point: every input change and every timer tick ends
/// up here. Only output edges reach the wire, so re-running with unchanged
/// inputs publishes nothing.
async fn evaluate_and_publish(app_state: &AppState) {
    let now_ms = monotonic_ms();
    let commands = {
        let mut engine = app_state.engine.lock().await;
        engine.tick(now_ms)
    };

    if !commands.is_empty() {
        publish_relay_commands(app_state, &commands).await;
    }
}

async fn publish_relay_commands(app_state: &AppState, commands: &[RelayCommand]) {
    for command in commands {
        let topic = relay_topic(command.terminal);
        let payload = if command.energized { "1" } else { "0" };

        info!(
            "relay {} -> {}",
            command.terminal.as_str(),
            if command.energized { "on" } else { "off" }
        );
        if let Err(err) = app_state
            .mqtt
            .publish(topic, QoS::AtLeastOnce, true, payload)
            .await
        {
            warn!("relay command publish failed on {topic}: {err}");
        }
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let now_ms = monotonic_ms();

    match topic.as_str() {
        TOPIC_SENSOR_TEMP => {
            if let Ok(temp) = message.parse::<f32>() {
                let accepted = {
                    let mut engine = app_state.engine.lock().await;
                    let valid_range =
                        engine.config.min_valid_temp_f..=engine.config.max_valid_temp_f;
                    if temp.is_finite() && valid_range.contains(&temp) {
                        engine.update_reading(temp, now_ms);
                        true
                    } else {
                        false
                    }
                };
                if accepted {
                    evaluate_and_publish(app_state).await;
                }
            }
        }
        TOPIC_CMD_SETPOINT => {
            if let Ok(setpoint) = message.parse::<f32>() {
                let changed = {
                    let mut engine = app_state.engine.lock().await;
                    engine.set_setpoint(setpoint)
                };
                if changed {
                    persist_runtime_from_state(app_state).await?;
                }
                evaluate_and_publish(app_state).await;
            }
        }
        TOPIC_CMD_MODE => {
            if let Some(mode) = parse_mode(&message) {
                let changed = {
                    let mut engine = app_state.engine.lock().await;
                    engine.set_mode(mode)
                };
                evaluate_and_publish(app_state).await;
                if changed {
                    persist_runtime_from_state(app_state).await?;
                }
            }
        }
        TOPIC_CMD_HOLD => {
            let lower = message.to_ascii_lowercase();
            {
                let mut engine = app_state.engine.lock().await;
                if lower == "on" || lower == "enter" {
                    engine.enter_hold(None, now_ms);
                } else if lower == "off" || lower == "exit" {
                    engine.exit_hold();
                } else if let Ok(minutes) = lower.parse::<u64>() {
                    if minutes > 0 {
                        let capped = minutes.min(engine.config.max_hold_minutes as u64);
                        engine.enter_hold(Some(capped * 60_000), now_ms);
                    }
                }
            }
            evaluate_and_publish(app_state).await;
        }
        TOPIC_CMD_SCHEDULE => {
            if let Ok(mut schedule) = serde_json::from_str::<Schedule>(&message) {
                schedule.normalize();
                {
                    let mut active = app_state.schedule.lock().await;
                    *active = schedule.clone();
                }
                app_state.store.save_schedule(&schedule).await?;
            }
        }
        _ => {}
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let timezone = state.timezone.lock().await.clone();

    let next_schedule = {
        let schedule = state.schedule.lock().await;
        now_in_timezone(&timezone).and_then(|now| schedule.next_event_epoch(now))
    };

    let schedule_enabled = state.schedule.lock().await.enabled;
    let time_synced = state.time_synced.load(Ordering::Relaxed);

    let status = {
        let engine = state.engine.lock().await;
        engine.status(
            now_ms,
            schedule_enabled,
            next_schedule,
            time_synced,
            &timezone,
        )
    };

    Json(status)
}

async fn handle_set_target(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(setpoint) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        engine.set_setpoint(setpoint)
    };
    evaluate_and_publish(&state).await;

    if changed {
        if let Err(err) = persist_runtime_from_state(&state).await {
            warn!("failed to persist target update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let Some(mode) = parse_mode(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid mode. Use 'OFF', 'HEAT', 'COOL', or 'AUTO'",
        );
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        engine.set_mode(mode)
    };
    evaluate_and_publish(&state).await;

    if changed {
        if let Err(err) = persist_runtime_from_state(&state).await {
            warn!("failed to persist mode update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.engine.lock().await.settings().clone();
    Json(settings)
}

async fn handle_set_threshold(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(key_name) = params.get("key") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'key' parameter");
    };
    let Some(key) = parse_threshold_key(key_name) else {
        return error_response(StatusCode::BAD_REQUEST, "Unknown threshold key");
    };
    let Some(value) = params.get("value").and_then(|raw| raw.parse::<f64>().ok()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'value' parameter");
    };

    let result = {
        let mut engine = state.engine.lock().await;
        engine.set_threshold(key, value)
    };
    if let Err(err) = result {
        return settings_error_response(&err);
    }

    // Shorter guard thresholds must take effect on the running cycle.
    evaluate_and_publish(&state).await;

    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist threshold update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_settings(State(state)).await.into_response()
}

async fn handle_set_auto(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(enabled) = params.get("value").and_then(|raw| raw.parse::<bool>().ok()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing or invalid 'value' parameter (true/false)",
        );
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        engine.set_auto_heat_cool(enabled)
    };
    evaluate_and_publish(&state).await;

    if changed {
        if let Err(err) = persist_runtime_from_state(&state).await {
            warn!("failed to persist auto heat/cool update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }

    handle_get_settings(State(state)).await.into_response()
}

async fn handle_set_staging(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let staging = match params.get("value").map(|raw| raw.to_ascii_lowercase()) {
        Some(value) if value == "auto" => Staging::Auto,
        Some(value) if value == "manual" => Staging::Manual,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid staging value. Use 'auto' or 'manual'",
            )
        }
    };

    let changed = {
        let mut engine = state.engine.lock().await;
        engine.set_staging(staging)
    };

    if changed {
        if let Err(err) = persist_runtime_from_state(&state).await {
            warn!("failed to persist staging update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist runtime settings",
            );
        }
    }

    handle_get_settings(State(state)).await.into_response()
}

async fn handle_apply_preset(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(preset) = params.get("name").and_then(|name| SettingsPreset::from_name(name)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Unknown preset. Use 'default', 'energy-saver', 'comfort', or 'aggressive'",
        );
    };

    let result = {
        let mut engine = state.engine.lock().await;
        engine.apply_preset(preset)
    };
    if let Err(err) = result {
        return settings_error_response(&err);
    }

    evaluate_and_publish(&state).await;

    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist preset: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_settings(State(state)).await.into_response()
}

async fn handle_set_comfort(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(mode) = params.get("mode").and_then(|raw| parse_comfort_mode(raw)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid comfort mode. Use 'home', 'away', or 'sleep'",
        );
    };
    let Some(heat) = params.get("heat").and_then(|raw| raw.parse::<f32>().ok()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'heat' parameter");
    };
    let Some(cool) = params.get("cool").and_then(|raw| raw.parse::<f32>().ok()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing or invalid 'cool' parameter");
    };

    let fan_mode = match params.get("fan").map(|raw| raw.to_ascii_lowercase()) {
        Some(value) if value == "on" => Some(FanMode::On),
        Some(value) if value == "auto" => Some(FanMode::Auto),
        Some(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Invalid fan value. Use 'auto' or 'on'",
            )
        }
        None => None,
    };

    let result = {
        let mut engine = state.engine.lock().await;
        let fan_mode = fan_mode.unwrap_or(engine.settings().comfort.get(mode).fan_mode);
        engine.set_comfort_profile(
            mode,
            ComfortProfile {
                heat_set_point: heat,
                cool_set_point: cool,
                fan_mode,
            },
        )
    };
    if let Err(err) = result {
        return settings_error_response(&err);
    }

    evaluate_and_publish(&state).await;

    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist comfort profile update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_settings(State(state)).await.into_response()
}

async fn handle_hold_enter(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    {
        let mut engine = state.engine.lock().await;
        // No minutes means the hold stands until released.
        let duration_ms = params
            .get("minutes")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|minutes| *minutes > 0)
            .map(|minutes| minutes.min(engine.config.max_hold_minutes as u64) * 60_000);
        engine.enter_hold(duration_ms, monotonic_ms());
    }
    evaluate_and_publish(&state).await;

    handle_get_status(State(state)).await.into_response()
}

async fn handle_hold_exit(State(state): State<AppState>) -> impl IntoResponse {
    {
        let mut engine = state.engine.lock().await;
        engine.exit_hold();
    }
    evaluate_and_publish(&state).await;

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    let schedule = state.schedule.lock().await.clone();
    Json(schedule)
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(mut schedule): Json<Schedule>,
) -> impl IntoResponse {
    schedule.normalize();
    {
        let mut active = state.schedule.lock().await;
        *active = schedule.clone();
    }

    if let Err(err) = state.store.save_schedule(&schedule).await {
        warn!("failed to persist schedule update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist schedule",
        );
    }

    handle_get_schedule(State(state)).await.into_response()
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let timezone = state.timezone.lock().await.clone();
    Json(TimeStatus {
        time_synced: state.time_synced.load(Ordering::Relaxed),
        timezone,
        now_epoch: Utc::now().timestamp(),
    })
}

async fn handle_put_timezone(
    State(state): State<AppState>,
    Json(update): Json<TimezoneUpdate>,
) -> impl IntoResponse {
    if update.timezone.parse::<Tz>().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid timezone value");
    }

    {
        let mut timezone = state.timezone.lock().await;
        *timezone = update.timezone;
    }

    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist timezone update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_time(State(state)).await.into_response()
}

async fn handle_get_network(State(state): State<AppState>) -> impl IntoResponse {
    let runtime = state
        .store
        .load_runtime_config()
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load network config from store: {err:#}");
            RuntimeConfig::default()
        });
    Json(build_network_config_view(&runtime.network))
}

async fn handle_put_network(
    State(state): State<AppState>,
    Json(update): Json<NetworkConfigUpdate>,
) -> impl IntoResponse {
    if update.mqtt_host.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "mqttHost cannot be empty");
    }
    if update.mqtt_port == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "mqttPort must be between 1 and 65535",
        );
    }

    let mut runtime = state
        .store
        .load_runtime_config()
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load existing runtime config for update: {err:#}");
            RuntimeConfig::default()
        });

    let previous = runtime.network.clone();
    runtime.network.mqtt_host = update.mqtt_host;
    runtime.network.mqtt_port = update.mqtt_port;
    runtime.network.mqtt_user = update.mqtt_user;
    if let Some(pass) = update.mqtt_pass {
        runtime.network.mqtt_pass = pass;
    }

    if let Err(err) = state.store.save_runtime_config(&runtime).await {
        warn!("failed to persist network config update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist network settings",
        );
    }

    let payload = NetworkUpdateResponse {
        restart_required: previous != runtime.network,
        network: build_network_config_view(&runtime.network),
    };
    Json(payload).into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("PROSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.prostat"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            schedule_path: Arc::new(data_dir.join("schedule.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    async fn load_schedule(&self) -> anyhow::Result<Schedule> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.schedule_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<Schedule>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Schedule::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.schedule_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(schedule)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

async fn persist_runtime_from_state(state: &AppState) -> anyhow::Result<()> {
    let settings = state.engine.lock().await.settings().clone();
    let timezone = state.timezone.lock().await.clone();

    let mut runtime = state.store.load_runtime_config().await?;
    runtime.settings = settings;
    runtime.timezone = timezone;
    state.store.save_runtime_config(&runtime).await
}

fn build_network_config_view(network: &NetworkConfig) -> NetworkConfigView {
    NetworkConfigView {
        mqtt_host: network.mqtt_host.clone(),
        mqtt_port: network.mqtt_port,
        mqtt_user: network.mqtt_user.clone(),
        mqtt_pass_set: !network.mqtt_pass.is_empty(),
    }
}

fn parse_mode(value: &str) -> Option<OperatingMode> {
    match value.to_ascii_uppercase().as_str() {
        "OFF" => Some(OperatingMode::Off),
        "HEAT" => Some(OperatingMode::Heat),
        "COOL" => Some(OperatingMode::Cool),
        "AUTO" => Some(OperatingMode::Auto),
        _ => None,
    }
}

fn parse_comfort_mode(value: &str) -> Option<ComfortMode> {
    match value.to_ascii_lowercase().as_str() {
        "home" => Some(ComfortMode::Home),
        "away" => Some(ComfortMode::Away),
        "sleep" => Some(ComfortMode::Sleep),
        _ => None,
    }
}

fn parse_threshold_key(name: &str) -> Option<ThresholdKey> {
    ThresholdKey::ALL.into_iter().find(|key| key.as_str() == name)
}

fn settings_error_response(err: &SettingsError) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: err.to_string(),
            kind: Some(err.kind()),
        }),
    )
        .into_response()
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
            kind: None,
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
