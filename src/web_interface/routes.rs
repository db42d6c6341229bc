use std::convert::Infallible;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use warp::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use warp::http::{Response, StatusCode};
use warp::hyper::Body;
use warp::ws::{Message, WebSocket, Ws};
use warp::{reply, Filter, Rejection, Reply};

use super::types::*;
use crate::alerting::{AlertChannel, AlertDispatcher};
use crate::error_handling::types::{RegistryError, SupervisorError};
use crate::session_management::MonitoringSupervisor;
use crate::storage::Storage;
use crate::streaming::mjpeg;
use crate::streaming::StreamMultiplexer;

const MAX_RELAY_FRAME: u64 = 8 * 1024 * 1024;

/// Everything the HTTP adapter talks to.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<MonitoringSupervisor>,
    pub multiplexer: Arc<StreamMultiplexer>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub storage: Arc<dyn Storage>,
}

/// All routes of the API.
pub fn api_routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    start_monitoring_route(state.supervisor.clone())
        .or(stop_camera_route(state.supervisor.clone()))
        .or(stop_monitoring_route(state.supervisor.clone()))
        .or(monitoring_route(state.supervisor.clone()))
        .or(start_recording_route(state.supervisor.clone()))
        .or(stop_recording_route(state.supervisor.clone()))
        .or(stream_route(state.supervisor.clone(), state.multiplexer.clone()))
        .or(relay_frame_route(state.supervisor.clone()))
        .or(accident_videos_route(state.storage.clone()))
        .or(alert_socket_route(state.dispatcher.clone()))
        .or(status_route(state.supervisor, state.dispatcher))
}

fn json_error(message: impl Into<String>, status: StatusCode) -> reply::Response {
    reply::with_status(reply::json(&ApiError::new(message)), status).into_response()
}

fn supervisor_error(err: SupervisorError) -> reply::Response {
    let status = match err {
        SupervisorError::NotFound => StatusCode::NOT_FOUND,
        SupervisorError::RegistryError(_) | SupervisorError::RecordingFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(err.to_string(), status)
}

/// POST /start-monitoring/:user
pub fn start_monitoring_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("start-monitoring" / String)
        .and(warp::post())
        .and(warp::body::json())
        .and_then(move |user_id: String, request: StartMonitoringRequest| {
            let supervisor = supervisor.clone();
            async move {
                if request.selected_cameras.is_empty() {
                    return Ok::<_, Rejection>(json_error(
                        "No cameras selected",
                        StatusCode::BAD_REQUEST,
                    ));
                }

                let mut response = StartMonitoringResponse::default();
                for index in request.selected_cameras {
                    match supervisor.start_camera(&user_id, index) {
                        Ok(outcome) if outcome.is_new() => response.started.push(index),
                        Ok(_) => response.already_running.push(index),
                        Err(e) => {
                            warn!("[{}/{}] Cannot start monitoring: {}", user_id, index, e);
                            response.failed.push(CameraFailure {
                                index,
                                error: e.to_string(),
                            });
                        }
                    }
                }
                Ok::<_, Rejection>(reply::json(&response).into_response())
            }
        })
}

/// POST /stop-monitoring/:user
pub fn stop_monitoring_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("stop-monitoring" / String)
        .and(warp::post())
        .map(move |user_id: String| {
            let mut stopped: Vec<usize> = supervisor
                .stop_all(&user_id)
                .iter()
                .map(|handle| handle.info().key.index)
                .collect();
            stopped.sort_unstable();
            info!("Stopped {} sessions of user {}", stopped.len(), user_id);
            reply::json(&StopMonitoringResponse { stopped })
        })
}

/// POST /stop-monitoring/:user/:index
pub fn stop_camera_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("stop-monitoring" / String / usize)
        .and(warp::post())
        .map(move |user_id: String, index: usize| {
            match supervisor.stop(&user_id, index) {
                Ok(handle) => reply::json(&handle.info()).into_response(),
                Err(e) => supervisor_error(e),
            }
        })
}

/// GET /monitoring/:user
pub fn monitoring_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("monitoring" / String)
        .and(warp::get())
        .map(move |user_id: String| {
            let sessions = supervisor.sessions(&user_id);
            reply::json(&MonitoringResponse { user_id, sessions })
        })
}

/// POST /cctv/start-recording
pub fn start_recording_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("cctv" / "start-recording")
        .and(warp::post())
        .and(warp::body::json())
        .map(move |request: RecordingRequest| {
            match supervisor.start_recording(&request.user_id, request.camera_index) {
                Ok(info) => reply::json(&info).into_response(),
                Err(e) => supervisor_error(e),
            }
        })
}

/// POST /cctv/stop-recording
pub fn stop_recording_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("cctv" / "stop-recording")
        .and(warp::post())
        .and(warp::body::json())
        .map(move |request: RecordingRequest| {
            match supervisor.stop_recording(&request.user_id, request.camera_index) {
                Ok(info) => reply::json(&info).into_response(),
                Err(e) => supervisor_error(e),
            }
        })
}

/// GET /cctv/stream/:user/:index
pub fn stream_route(
    supervisor: Arc<MonitoringSupervisor>,
    multiplexer: Arc<StreamMultiplexer>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("cctv" / "stream" / String / usize)
        .and(warp::get())
        .map(move |user_id: String, index: usize| {
            let camera = match supervisor.registry().get_camera(&user_id, index) {
                Ok(camera) => camera,
                Err(RegistryError::NotFound) => {
                    return json_error("Camera not found", StatusCode::NOT_FOUND)
                }
                Err(e) => return json_error(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
            };

            debug!("{} New viewer", camera.label());
            let tap = supervisor.subscribe(&camera.key);
            let parts = multiplexer
                .open_stream(camera, tap)
                .map(Ok::<_, Infallible>);

            Response::builder()
                .header(CONTENT_TYPE, mjpeg::content_type())
                .header(CACHE_CONTROL, "no-cache")
                .body(Body::wrap_stream(parts))
                .unwrap_or_else(|e| {
                    error!("Cannot build stream response: {}", e);
                    json_error("Stream unavailable", StatusCode::INTERNAL_SERVER_ERROR)
                })
        })
}

/// POST /relay/frame/:user/:index with a JPEG body
pub fn relay_frame_route(
    supervisor: Arc<MonitoringSupervisor>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("relay" / "frame" / String / usize)
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_RELAY_FRAME))
        .and(warp::body::bytes())
        .map(move |user_id: String, index: usize, body: bytes::Bytes| {
            match supervisor.push_relay_frame(&user_id, index, &body) {
                Ok(delivered) => reply::json(&RelayFrameResponse { delivered }).into_response(),
                Err(e) => json_error(e.to_string(), StatusCode::BAD_REQUEST),
            }
        })
}

/// GET /accident-videos/:user
pub fn accident_videos_route(
    storage: Arc<dyn Storage>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("accident-videos" / String)
        .and(warp::get())
        .and_then(move |user_id: String| {
            let storage = storage.clone();
            async move {
                match storage.list_clips(&user_id) {
                    Ok(list) => {
                        Ok::<_, Rejection>(reply::with_status(reply::json(&list), StatusCode::OK))
                    }
                    Err(e) => {
                        error!("Cannot list clips of {}: {}", user_id, e);
                        Ok::<_, Rejection>(reply::with_status(
                            reply::json(&ApiError::new("Failed to load accident videos")),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        ))
                    }
                }
            }
        })
}

/// GET /ws/alert/:user
pub fn alert_socket_route(
    dispatcher: Arc<AlertDispatcher>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("ws" / "alert" / String)
        .and(warp::ws())
        .map(move |user_id: String, ws: Ws| {
            let dispatcher = dispatcher.clone();
            ws.on_upgrade(move |socket| alert_socket(socket, user_id, dispatcher))
        })
}

/// Pushes the user's alerts into the socket until either side closes it.
/// A channel replaced by a newer socket ends here too.
async fn alert_socket(socket: WebSocket, user_id: String, dispatcher: Arc<AlertDispatcher>) {
    let (channel, mut alerts) = AlertChannel::new();
    let channel_id = channel.id();
    dispatcher.register(&user_id, channel);
    let (mut outgoing, mut incoming) = socket.split();

    loop {
        tokio::select! {
            alert = alerts.recv() => match alert {
                Some(text) => {
                    if let Err(e) = outgoing.send(Message::text(text)).await {
                        debug!("Alert socket of {} failed: {}", user_id, e);
                        break;
                    }
                }
                None => break,
            },
            message = incoming.next() => match message {
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Alert socket of {} failed: {}", user_id, e);
                    break;
                }
                None => break,
            },
        }
    }

    let _ = outgoing.close().await;
    dispatcher.unregister(&user_id, channel_id);
}

/// GET /status
pub fn status_route(
    supervisor: Arc<MonitoringSupervisor>,
    dispatcher: Arc<AlertDispatcher>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .map(move || {
            reply::json(&StatusResponse {
                active_sessions: supervisor.active_count(),
                alert_channels: dispatcher.channel_count(),
                relay_routes: supervisor.relay_routes(),
            })
        })
}
