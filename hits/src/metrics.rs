use {
    std::{convert::Infallible, net::SocketAddr, pin::Pin},
    tracing::{error, info},
    tokio::net::TcpListener,
    hyper::{Request, body::{Incoming, Bytes}, Response, server::conn::http1},
    hyper_util::rt::{TokioIo, TokioTimer},
    http_body_util::Full,
    prometheus::{
        TextEncoder,
        Registry,
        IntGauge,
        IntCounter,
        register_int_gauge_with_registry,
        register_int_counter_with_registry,
    },
    hits_core::VisitCountResponse,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    pub(crate) http_requests_total: IntCounter,
    pub(crate) http_requests_in_flight: IntGauge,
    pub(crate) visit_count_increments_total: IntCounter,
    pub(crate) visit_count_errors_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = register_int_counter_with_registry!("http_requests_total", "total http requests processed", registry)?;
        let http_requests_in_flight = register_int_gauge_with_registry!("http_requests_in_flight", "http requests being processed", registry)?;
        let visit_count_increments_total = register_int_counter_with_registry!("visit_count_increments_total", "counter increments that succeeded", registry)?;
        let visit_count_errors_total = register_int_counter_with_registry!("visit_count_errors_total", "counter requests that failed with an internal error", registry)?;

        Ok(Self {
            registry,
            http_requests_total,
            http_requests_in_flight,
            visit_count_increments_total,
            visit_count_errors_total,
        })
    }

    pub(crate) fn record_response(&self, response: &VisitCountResponse) {
        match response {
            VisitCountResponse::Counted { .. } => self.visit_count_increments_total.inc(),
            other if other.is_server_error() => self.visit_count_errors_total.inc(),
            _ => {},
        }
    }

    pub fn encode(&self) -> String {
        let metrics = self.registry.gather();
        let encoder = TextEncoder::new();
        match encoder.encode_to_string(&metrics) {
            Ok(v) => v,
            Err(err) => {
                error!("failed to encode metrics: {err:?}");
                String::new()
            }
        }
    }
}

pub async fn run_metrics_server(metrics: Metrics, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("running metrics server on {addr:?}");
    serve_metrics(listener, metrics).await;
    Ok(())
}

/// Serves the text exposition of `metrics` on every path.
pub async fn serve_metrics(listener: TcpListener, metrics: Metrics) {
    let metrics_server = MetricsServer::new(metrics);

    loop {
        let (tcp, _) = match listener.accept().await {
            Ok(v) => v,
            Err(err) => {
                error!("failed to accept metrics connection: {err:?}");
                continue;
            }
        };
        let io = TokioIo::new(tcp);
        let metrics_server = metrics_server.clone();
        tokio::task::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .timer(TokioTimer::new())
                .serve_connection(io, metrics_server)
                .await {
                    error!("error while handling metrics request: {err:?}");
                }
        });
    }
}

#[derive(Clone)]
struct MetricsServer {
    metrics: Metrics,
}

impl MetricsServer {
    pub fn new(metrics: Metrics) -> Self {
        Self {
            metrics,
        }
    }
}

impl hyper::service::Service<Request<Incoming>> for MetricsServer {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, _req: Request<Incoming>) -> Self::Future {
        let metrics = self.metrics.encode();
        Box::pin(async move { Ok(Response::new(Full::new(Bytes::from(metrics)))) })
    }
}
