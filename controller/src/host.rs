use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tracing::{info, warn};

use gaslog_common::{
    Clock, ClockReading, Command, CommandError, ControlEvent, ControlState, ModeController,
    RuntimeConfig, TemperatureSource, TOPIC_CMD_MODE, TOPIC_CMD_SETPOINT, TOPIC_SENSOR_TEMP,
    TOPIC_STATE_MODE, TOPIC_STATE_SETPOINT, TOPIC_STATE_TEMPERATURE, TOPIC_STATE_VALVE,
    TOPIC_STATE_VISIBLE, TOPIC_STATUS,
};

use crate::sim::{SensorFeed, SimulatedBridge, SimulatedRail, StdDelay};

type HostController = ModeController<SimulatedBridge, SimulatedRail, StdDelay>;

const MAX_MQTT_PAYLOAD_BYTES: usize = 64;

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<HostController>>,
    sensor: Arc<Mutex<SensorFeed>>,
    clock: HostClock,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

/// Monotonic milliseconds plus wall-clock time in the configured zone.
#[derive(Clone)]
struct HostClock {
    timezone: Arc<str>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    if let Err(err) = runtime.controller.validate() {
        warn!("stored controller config rejected ({err}); using defaults");
        runtime.controller = Default::default();
    }
    if runtime.timezone.parse::<Tz>().is_err() {
        warn!(
            timezone = %runtime.timezone,
            "unknown timezone; valve stays closed until it is fixed"
        );
    }

    let controller = tokio::task::block_in_place(|| {
        ModeController::new(
            &runtime.controller,
            &runtime.settings,
            SimulatedBridge::default(),
            SimulatedRail::from_env(),
            StdDelay,
            monotonic_ms(),
        )
    });

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("gaslog-controller", mqtt_host, mqtt_port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_STATUS,
        "Controller offline",
        QoS::AtLeastOnce,
        true,
    ));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let app_state = AppState {
        controller: Arc::new(Mutex::new(controller)),
        sensor: Arc::new(Mutex::new(SensorFeed::new(
            runtime.controller.sensor_stale_timeout_ms,
        ))),
        clock: HostClock {
            timezone: Arc::from(runtime.timezone.as_str()),
        },
        mqtt,
        store,
    };

    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(
        app_state.clone(),
        Duration::from_millis(runtime.controller.control_interval_ms),
    );
    spawn_state_publish_loop(
        app_state.clone(),
        Duration::from_millis(runtime.controller.state_publish_interval_ms.max(1)),
    );

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/setpoint", post(handle_set_setpoint))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.http_port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    for topic in [TOPIC_SENSOR_TEMP, TOPIC_CMD_MODE, TOPIC_CMD_SETPOINT] {
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
                        handle_mqtt_message(&app_state, &message.topic, &message.payload).await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    // Subscriptions do not survive a broker reconnect.
                    if let Err(err) = subscribe_topics(&app_state.mqtt).await {
                        warn!("mqtt subscribe failed: {err:#}");
                    }
                    publish_full_state(&app_state).await;
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

fn spawn_control_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let temperature_f = app_state.sensor.lock().await.read();
            let now = app_state.clock.now();

            let events = {
                let mut controller = app_state.controller.lock().await;
                // Supply sampling sleeps between ADC reads.
                tokio::task::block_in_place(|| controller.on_tick(now, temperature_f))
            };

            if !events.is_empty() {
                publish_events(&app_state, events).await;
            }
        }
    });
}

fn spawn_state_publish_loop(app_state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            publish_full_state(&app_state).await;
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = std::str::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    match topic {
        TOPIC_SENSOR_TEMP => {
            let reading = message.parse::<f32>().ok();
            app_state.sensor.lock().await.record(reading, monotonic_ms());
        }
        TOPIC_CMD_MODE => {
            apply_command(app_state, Command::mode(message)).await?;
        }
        TOPIC_CMD_SETPOINT => match message.parse::<i32>() {
            Ok(setpoint_f) => {
                apply_command(app_state, Command::setpoint(setpoint_f)).await?;
            }
            Err(_) => warn!(payload = message, "ignoring non-integer setpoint"),
        },
        _ => {}
    }

    Ok(())
}

/// Apply a command, broadcast the result, and persist a changed setpoint.
async fn apply_command(
    app_state: &AppState,
    command: Command,
) -> anyhow::Result<Option<CommandError>> {
    let setpoint_requested = command.setpoint_f.is_some();
    let outcome = {
        let mut controller = app_state.controller.lock().await;
        controller.apply_command(command)
    };

    let persist = setpoint_requested && outcome.changed;
    publish_events(app_state, outcome.events).await;
    if persist {
        persist_settings(app_state).await?;
    }
    Ok(outcome.rejected)
}

async fn publish_events(app_state: &AppState, events: Vec<ControlEvent>) {
    for event in events {
        match event {
            ControlEvent::StateChanged(state) => publish_control_state(app_state, &state).await,
            ControlEvent::Status(status) => {
                publish(app_state, TOPIC_STATUS, status.as_str().to_string()).await;
            }
            ControlEvent::ValveSettled { open } => {
                publish(app_state, TOPIC_STATE_VALVE, valve_payload(open).to_string()).await;
            }
        }
    }
}

async fn publish_full_state(app_state: &AppState) {
    let (state, status, open) = {
        let controller = app_state.controller.lock().await;
        (
            controller.control_state(),
            controller.status().as_str(),
            controller.valve().is_open(),
        )
    };

    publish_control_state(app_state, &state).await;
    publish(app_state, TOPIC_STATE_VALVE, valve_payload(open).to_string()).await;
    publish(app_state, TOPIC_STATUS, status.to_string()).await;
}

async fn publish_control_state(app_state: &AppState, state: &ControlState) {
    let temperature = if state.has_temperature() {
        format!("{:.1}", state.room_temp_f)
    } else {
        "nan".to_string()
    };

    publish(app_state, TOPIC_STATE_MODE, state.mode.as_str().to_string()).await;
    publish(
        app_state,
        TOPIC_STATE_VISIBLE,
        state.valve_state.as_str().to_string(),
    )
    .await;
    publish(app_state, TOPIC_STATE_TEMPERATURE, temperature).await;
    publish(app_state, TOPIC_STATE_SETPOINT, state.setpoint_f.to_string()).await;
}

async fn publish(app_state: &AppState, topic: &str, payload: String) {
    if let Err(err) = app_state
        .mqtt
        .publish(topic, QoS::AtLeastOnce, true, payload)
        .await
    {
        warn!("publish to {topic} failed: {err}");
    }
}

fn valve_payload(open: bool) -> &'static str {
    if open {
        "OPEN"
    } else {
        "CLOSED"
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now = state.clock.now();
    let status = {
        let controller = state.controller.lock().await;
        controller.status_report(now, now.local_time.is_some(), &state.clock.timezone)
    };

    Json(status)
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    match apply_command(&state, Command::mode(value.as_str())).await {
        Ok(None) => handle_get_status(State(state)).await.into_response(),
        Ok(Some(rejected @ CommandError::InvalidMode(_))) => {
            error_response(StatusCode::BAD_REQUEST, &rejected.to_string())
        }
        Ok(Some(rejected)) => error_response(StatusCode::CONFLICT, &rejected.to_string()),
        Err(err) => {
            warn!("mode command failed: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to apply mode")
        }
    }
}

async fn handle_set_setpoint(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(setpoint_f) = value.trim().parse::<i32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid setpoint value");
    };

    if let Err(err) = apply_command(&state, Command::setpoint(setpoint_f)).await {
        warn!("failed to persist setpoint update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_status(State(state)).await.into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("GASLOG_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.gaslog"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => serde_json::from_slice::<RuntimeConfig>(&raw)
                .with_context(|| format!("malformed {}", self.runtime_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

async fn persist_settings(state: &AppState) -> anyhow::Result<()> {
    let setpoint_f = state.controller.lock().await.control_state().setpoint_f;

    let mut runtime = state.store.load_runtime_config().await?;
    runtime.settings.setpoint_f = setpoint_f;
    state.store.save_runtime_config(&runtime).await
}

impl Clock for HostClock {
    fn now(&self) -> ClockReading {
        ClockReading::new(monotonic_ms(), local_time_in(&self.timezone))
    }
}

fn local_time_in(timezone: &str) -> Option<NaiveTime> {
    let tz: Tz = timezone.parse().ok()?;
    Some(Utc::now().with_timezone(&tz).time())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
