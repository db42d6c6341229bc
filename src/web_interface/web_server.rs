use std::future::Future;
use std::net::SocketAddr;

use log::info;
use warp::Filter;

use crate::configuration::ServerConfig;
use crate::error_handling::types::WebError;
use crate::web_interface::routes::{api_routes, AppState};

/// Web server for the HTTP and WebSocket API
pub struct WebServer {
    state: AppState,
    config: ServerConfig,
}

impl WebServer {
    pub fn new(state: AppState, config: ServerConfig) -> Self {
        Self { state, config }
    }

    pub fn address(&self) -> Result<SocketAddr, WebError> {
        format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| {
                WebError::BindFailed(format!(
                    "invalid address {}:{}: {}",
                    self.config.bind_address, self.config.port, e
                ))
            })
    }

    /// Binds the listener and returns the serving future, which completes
    /// once `shutdown` resolves and open requests are done.
    pub fn bind(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(SocketAddr, impl Future<Output = ()>), WebError> {
        let addr = self.address()?;
        let routes = api_routes(self.state.clone()).with(warp::log("vigil::http"));
        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| WebError::BindFailed(e.to_string()))?;
        info!("HTTP API listening on {}", bound);
        Ok((bound, server))
    }
}
