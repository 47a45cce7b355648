use {
    std::net::SocketAddr,
    tracing::{error, info},
    tokio::net::TcpListener,
    hyper_util::rt::{TokioIo, TokioTimer},
    hyper::server::conn::http1,
    crate::{
        config::ServerConfig,
        driver::DriverRegistry,
        error::ServerError,
        handler::CounterHandler,
        http::HttpHandler,
        metrics::{Metrics, run_metrics_server},
    },
};

pub struct CounterServer {
    config: ServerConfig,
    drivers: DriverRegistry,
}

impl CounterServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            drivers: DriverRegistry::default(),
        }
    }

    pub fn with_drivers(mut self, drivers: DriverRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Validates the config and opens one database connection, so that a broken setup fails at
    /// startup instead of on the first request.
    pub fn build(self) -> Result<HttpHandler, ServerError> {
        let database = self.config.database()?;
        info!("using database {:?} with driver {:?}, increment mode: {:?}", database.url, database.driver, database.increment_mode);

        let handler = CounterHandler::with_drivers(database, self.drivers);
        handler.check_connection()?;

        let metrics = Metrics::new().map_err(|err| ServerError::Metrics { reason: err.to_string() })?;
        HttpHandler::new(handler, metrics, self.config.worker_threads)
    }

    pub async fn serve(self) -> Result<(), ServerError> {
        let addr = SocketAddr::new(self.config.http.host, self.config.http.port);
        let metrics_addr = self.config.metrics.as_ref()
            .map(|metrics| SocketAddr::new(self.config.http.host, metrics.port));

        let http_handler = self.build()?;

        if let Some(metrics_addr) = metrics_addr {
            let metrics = http_handler.metrics().clone();
            tokio::spawn(async move {
                if let Err(err) = run_metrics_server(metrics, metrics_addr).await {
                    error!("metrics server stopped: {err:?}");
                }
            });
        }

        let listener = TcpListener::bind(addr).await
            .map_err(|err| ServerError::Bind {
                addr: addr.to_string(),
                reason: err.to_string(),
            })?;

        serve_listener(listener, http_handler).await;
        Ok(())
    }
}

pub async fn serve_listener(listener: TcpListener, http_handler: HttpHandler) {
    match listener.local_addr() {
        Ok(addr) => info!("running on {addr:?}"),
        Err(err) => error!("failed to get listener address: {err:?}"),
    }

    loop {
        let (tcp, _) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                error!("failed to accept connection: {err:?}");
                continue;
            }
        };
        let io = TokioIo::new(tcp);

        let http_handler = http_handler.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, http_handler)
                .await {
                    if err.is_timeout() {
                        // ignore timeouts, because those can be caused by client
                    } else {
                        error!("error while handling http request: {err:?}");
                    }
                }
        });
    }
}
