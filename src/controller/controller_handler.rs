use std::future::Future;
use std::sync::Arc;

use log::{error, info};

use crate::alerting::AlertDispatcher;
use crate::camera_registry::JsonCameraRegistry;
use crate::classification::HttpClassifier;
use crate::configuration::config::Config;
use crate::data_capture::{
    CaptureSettings, DefaultSourceFactory, FfmpegClipWriter, FfmpegRecordingFactory, RelayHub,
};
use crate::error_handling::types::*;
use crate::session_management::{MonitoringSupervisor, SessionContext};
use crate::storage::{FileStorage, Storage};
use crate::streaming::{FfmpegTranscoder, StreamMultiplexer};
use crate::web_interface::{AppState, WebServer};

/// Wires every component together and owns the process lifecycle.
pub struct Controller {
    pub config: Config,
    supervisor: Arc<MonitoringSupervisor>,
    web_server: WebServer,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initialising controller");
        config
            .prepare_directories()
            .map_err(ControllerError::ConfigurationError)?;

        let monitoring = config.monitoring.clone();
        let frame_size = (monitoring.frame_width, monitoring.frame_height);

        let storage: Arc<dyn Storage> = Arc::new(
            FileStorage::new(&config.storage.clips_dir).map_err(ControllerError::StorageError)?,
        );
        let classifier = HttpClassifier::new(&config.classifier.url, config.classifier.timeout())
            .map_err(|e| {
                error!("Cannot build the classifier client: {}", e);
                ControllerError::InitializationFailed(e.to_string())
            })?;

        let relays = Arc::new(RelayHub::new(frame_size.0, frame_size.1));
        let dispatcher = Arc::new(AlertDispatcher::new());
        let context = Arc::new(SessionContext {
            sources: Arc::new(DefaultSourceFactory::new(
                CaptureSettings::from(&monitoring),
                Arc::clone(&relays),
            )),
            classifier: Arc::new(classifier),
            clip_writer: Arc::new(FfmpegClipWriter::new(
                config.storage.clips_dir.clone(),
                Arc::clone(&storage),
            )),
            recordings: Arc::new(FfmpegRecordingFactory::new(
                config.storage.footage_dir.clone(),
                frame_size.0,
                frame_size.1,
                monitoring.nominal_fps,
            )),
            dispatcher: Arc::clone(&dispatcher),
            classifier_timeout: config.classifier.timeout(),
            config: monitoring,
        });

        let supervisor = Arc::new(MonitoringSupervisor::new(
            Arc::new(JsonCameraRegistry::new(&config.storage.cameras_file)),
            context,
            relays,
        ));
        let multiplexer = StreamMultiplexer::new(
            Arc::new(FfmpegTranscoder::new(config.stream.clone())),
            config.stream.clone(),
            frame_size,
        )
        .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;

        let web_server = WebServer::new(
            AppState {
                supervisor: Arc::clone(&supervisor),
                multiplexer: Arc::new(multiplexer),
                dispatcher,
                storage,
            },
            config.server.clone(),
        );

        Ok(Self {
            config,
            supervisor,
            web_server,
        })
    }

    /// Serves until Ctrl-C, then stops every session.
    pub async fn run(&self) -> Result<(), ControllerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Cannot listen for Ctrl-C: {}", e);
                return;
            }
            info!("Ctrl-C received, shutting down");
        })
        .await
    }

    /// Serves until `shutdown` resolves, then stops every session.
    pub async fn run_until(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ControllerError> {
        let (_, server) = self
            .web_server
            .bind(shutdown)
            .map_err(ControllerError::WebError)?;
        server.await;
        self.shutdown().await;
        Ok(())
    }

    /// Stops every monitoring session and waits until all cameras are released.
    pub async fn shutdown(&self) {
        let stopped = self.supervisor.shutdown_all().await;
        info!("{} monitoring sessions stopped", stopped.len());
    }

    pub fn supervisor(&self) -> &Arc<MonitoringSupervisor> {
        &self.supervisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1".into();
        config.server.port = 0;
        config.storage.clips_dir = dir.path().join("clips");
        config.storage.footage_dir = dir.path().join("footages");
        config.storage.cameras_file = dir.path().join("user_cameras.json");
        config
    }

    #[tokio::test]
    async fn new_prepares_directories() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config_in(&dir)).unwrap();
        assert!(dir.path().join("clips").join("index").is_dir());
        assert!(dir.path().join("footages").is_dir());
        assert_eq!(controller.supervisor().active_count(), 0);
    }

    #[tokio::test]
    async fn run_until_returns_after_shutdown_signal() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config_in(&dir)).unwrap();
        controller.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn unusable_bind_address_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.server.bind_address = "256.0.0.1".into();
        let controller = Controller::new(config).unwrap();
        let err = controller.run_until(async {}).await.unwrap_err();
        assert!(matches!(err, ControllerError::WebError(_)));
    }
}
