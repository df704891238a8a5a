//! Programmatic configuration.
//!
//! [`Options`] collects every tunable of the supervisor with its default,
//! one setter per option (last write wins), and [`Options::build`] freezes
//! them into the immutable [`Parameters`] the lifecycle runs on.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::loader::ConfigError;
use crate::config::schema::Config;
use crate::http::{HyperEngine, IgnoredErrors, RecoveryLayer, ServeOptions, ServingEngine};
use crate::lifecycle::{CancellationPair, ReadySink, Supervisor};
use crate::net::tls::load_tls_config;
use crate::net::{ListenAddress, ListenConfig, ListenerAdapter, SocketBinder};
use crate::observability::{Logger, Monitor, NopMonitor, TracingLogger};

pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FORCE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Everything the lifecycle needs, fixed at build time.
pub struct Parameters {
    pub(crate) listen: ListenAddress,
    pub(crate) binder: Arc<dyn SocketBinder>,
    pub(crate) tls: Option<RustlsConfig>,
    pub(crate) adapter: Option<Arc<dyn ListenerAdapter>>,
    pub(crate) ready: ReadySink,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) force_shutdown_timeout: Duration,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) engine: Arc<dyn ServingEngine>,
}

/// Builder for a [`Supervisor`].
///
/// Defaults: listen on `0.0.0.0:80` over plain TCP with `SO_REUSEPORT`, a
/// handler answering `200` to everything, panic recovery on, 2 KiB header
/// cap, 5s/1s/90s/30s read/header/write/idle timeouts, 5s shutdown timeout,
/// 1s forced drain, and `tracing`-backed loggers.
pub struct Options {
    context: CancellationToken,
    listen: ListenAddress,
    tls: Option<RustlsConfig>,
    handler: Option<Router>,
    handle_panic: bool,
    ignored_errors: IgnoredErrors,
    dump_requests: bool,
    engine: Option<Arc<dyn ServingEngine>>,
    serve: ServeOptions,
    shutdown_timeout: Duration,
    force_shutdown_timeout: Duration,
    binder: Option<Arc<dyn SocketBinder>>,
    reuse_port: bool,
    adapter: Option<Arc<dyn ListenerAdapter>>,
    ready: Option<oneshot::Sender<bool>>,
    monitor: Arc<dyn Monitor>,
    logger: Arc<dyn Logger>,
    error_logger: Arc<dyn Logger>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            context: CancellationToken::new(),
            listen: ListenAddress::default(),
            tls: None,
            handler: None,
            handle_panic: true,
            ignored_errors: IgnoredErrors::default(),
            dump_requests: false,
            engine: None,
            serve: ServeOptions::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            force_shutdown_timeout: DEFAULT_FORCE_SHUTDOWN_TIMEOUT,
            binder: None,
            reuse_port: true,
            adapter: None,
            ready: None,
            monitor: Arc::new(NopMonitor),
            logger: Arc::new(TracingLogger),
            error_logger: Arc::new(TracingLogger),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed options from a validated file configuration, loading TLS
    /// material when the file names it.
    pub async fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let timeouts = &config.timeouts;
        let mut options = Self::new()
            .listen_address(&config.listener.address)
            .reuse_port(config.listener.reuse_port)
            .max_request_header_size(config.limits.max_request_header_bytes)
            .read_request_timeout(timeouts.read_request())
            .read_header_timeout(timeouts.read_header())
            .write_response_timeout(timeouts.write_response())
            .idle_connection_timeout(timeouts.idle_connection())
            .shutdown_timeout(timeouts.shutdown())
            .force_shutdown_timeout(timeouts.force_shutdown())
            .handle_panic(config.recovery.enabled)
            .dump_requests(config.recovery.dump_requests);

        if let Some(tls) = &config.listener.tls {
            let material = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                .await
                .map_err(ConfigError::Tls)?;
            options = options.tls(material);
        }

        Ok(options)
    }

    /// Parent cancellation. Cancelling it shuts the server down as if
    /// `close()` had been called.
    pub fn context(mut self, parent: CancellationToken) -> Self {
        self.context = parent;
        self
    }

    /// `host:port`, `:port`, `scheme://host:port` or `unix://path`.
    /// Empty disables listening.
    pub fn listen_address(mut self, address: &str) -> Self {
        self.listen = ListenAddress::parse(address);
        self
    }

    pub fn tls(mut self, config: RustlsConfig) -> Self {
        self.tls = Some(config);
        self
    }

    pub fn handler(mut self, router: Router) -> Self {
        self.handler = Some(router);
        self
    }

    /// Catch handler panics and answer 500.
    pub fn handle_panic(mut self, enabled: bool) -> Self {
        self.handle_panic = enabled;
        self
    }

    pub fn ignored_errors(mut self, ignored: IgnoredErrors) -> Self {
        self.ignored_errors = ignored;
        self
    }

    pub fn dump_requests(mut self, enabled: bool) -> Self {
        self.dump_requests = enabled;
        self
    }

    /// Replace the default [`HyperEngine`]. The handler, panic recovery and
    /// serving limits only configure the default engine.
    pub fn engine(mut self, engine: Arc<dyn ServingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn max_request_header_size(mut self, bytes: usize) -> Self {
        self.serve.max_header_bytes = bytes;
        self
    }

    pub fn read_request_timeout(mut self, timeout: Duration) -> Self {
        self.serve.read_timeout = timeout;
        self
    }

    pub fn read_header_timeout(mut self, timeout: Duration) -> Self {
        self.serve.read_header_timeout = timeout;
        self
    }

    pub fn write_response_timeout(mut self, timeout: Duration) -> Self {
        self.serve.write_timeout = timeout;
        self
    }

    pub fn idle_connection_timeout(mut self, timeout: Duration) -> Self {
        self.serve.idle_timeout = timeout;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn force_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.force_shutdown_timeout = timeout;
        self
    }

    /// Replace the default [`ListenConfig`] binder.
    pub fn binder(mut self, binder: Arc<dyn SocketBinder>) -> Self {
        self.binder = Some(binder);
        self
    }

    /// `SO_REUSEPORT` for the default binder.
    pub fn reuse_port(mut self, enabled: bool) -> Self {
        self.reuse_port = enabled;
        self
    }

    pub fn listen_adapter(mut self, adapter: Arc<dyn ListenerAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Receive `true` once bound, or `false` if binding failed.
    pub fn listen_ready(mut self, ready: oneshot::Sender<bool>) -> Self {
        self.ready = Some(ready);
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Receives connection and accept errors from the default engine.
    pub fn error_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.error_logger = logger;
        self
    }

    pub fn build(self) -> Supervisor {
        let signals = CancellationPair::new(&self.context);

        let engine = match self.engine {
            Some(engine) => engine,
            None => {
                let mut app = self.handler.unwrap_or_else(default_handler);
                if self.handle_panic {
                    app = app.layer(
                        RecoveryLayer::new(self.monitor, Arc::clone(&self.logger))
                            .ignored_errors(self.ignored_errors)
                            .dump_requests(self.dump_requests),
                    );
                }
                Arc::new(HyperEngine::new(app, self.serve, signals.hard().clone(), self.error_logger))
            }
        };

        let reuse_port = self.reuse_port;
        let binder = self.binder.unwrap_or_else(|| {
            Arc::new(ListenConfig {
                reuse_port,
                ..ListenConfig::default()
            })
        });

        let params = Parameters {
            listen: self.listen,
            binder,
            tls: self.tls,
            adapter: self.adapter,
            ready: ReadySink::new(self.ready),
            shutdown_timeout: self.shutdown_timeout,
            force_shutdown_timeout: self.force_shutdown_timeout,
            logger: self.logger,
            engine,
        };

        Supervisor::new(params, signals)
    }
}

/// Answers every request with an empty `200 OK`.
fn default_handler() -> Router {
    Router::new().fallback(|| async { StatusCode::OK })
}
