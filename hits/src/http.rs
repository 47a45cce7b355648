use {
    std::{convert::Infallible, pin::Pin, sync::Arc},
    tracing::error,
    tokio::sync::oneshot,
    hyper::{Request, Response, body::{Bytes, Incoming}, header::{CONTENT_TYPE, HeaderValue}},
    http_body_util::Full,
    rayon::{ThreadPool, ThreadPoolBuilder},
    hits_core::{CounterRequest, VisitCountResponse, CONTENT_TYPE_JSON},
    crate::{handler::CounterHandler, metrics::Metrics, error::ServerError},
};

/// Hyper service that runs the counter handler on a worker pool, every request path and method
/// ends up in the same handler.
#[derive(Clone)]
pub struct HttpHandler {
    engine: Arc<Engine>,
}

struct Engine {
    thread_pool: ThreadPool,
    handler: CounterHandler,
    metrics: Metrics,
}

impl HttpHandler {
    pub fn new(handler: CounterHandler, metrics: Metrics, worker_threads: Option<usize>) -> Result<Self, ServerError> {
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads.unwrap_or(0))
            .thread_name(|index| format!("hits-worker-{index}"))
            .build()
            .map_err(|err| ServerError::WorkerPool { reason: err.to_string() })?;

        Ok(Self {
            engine: Arc::new(Engine {
                thread_pool,
                handler,
                metrics,
            }),
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.engine.metrics
    }
}

impl Engine {
    fn handle(&self, request: CounterRequest) -> VisitCountResponse {
        self.metrics.http_requests_in_flight.inc();
        let response = self.handler.handle(&request);
        self.metrics.http_requests_in_flight.dec();
        self.metrics.record_response(&response);
        response
    }
}

impl hyper::service::Service<Request<Incoming>> for HttpHandler {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let request = CounterRequest::from_uri(req.uri());
        self.engine.metrics.http_requests_total.inc();

        let (tx, rx) = oneshot::channel();
        let engine = self.engine.clone();
        self.engine.thread_pool.spawn(move || {
            // receiver is gone when the client disconnected
            let _ = tx.send(engine.handle(request));
        });

        Box::pin(async move {
            let response = match rx.await {
                Ok(v) => v,
                Err(_) => {
                    error!("worker dropped the request without a response");
                    VisitCountResponse::internal_error()
                }
            };
            Ok(into_http_response(&response))
        })
    }
}

pub fn into_http_response(response: &VisitCountResponse) -> Response<Full<Bytes>> {
    let mut http_response = Response::new(Full::new(Bytes::from(response.to_json())));
    *http_response.status_mut() = response.status();
    http_response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    http_response
}
