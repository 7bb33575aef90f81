use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;

const SERVER_TIMING: &str = "server-timing";

/// Request logging plus a `Server-Timing` entry for this service
///
/// An entry already on the response (from a downstream service) is kept
/// and ours is appended to it.
pub struct ServerTiming {
    key: Rc<str>,
}

impl ServerTiming {
    pub fn new(key: &str) -> Self {
        Self { key: Rc::from(key) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ServerTiming
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ServerTimingService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(ServerTimingService {
            service: Rc::new(service),
            key: self.key.clone(),
        }))
    }
}

pub struct ServerTimingService<S> {
    service: Rc<S>,
    key: Rc<str>,
}

impl<S, B> Service<ServiceRequest> for ServerTimingService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();

        let service = self.service.clone();
        let key = self.key.clone();

        Box::pin(async move {
            let mut res = service.call(req).await?;

            let elapsed_ms = start_time.elapsed().as_millis() as u64;
            let status = res.status().as_u16();

            tracing::info!(%method, %path, status, elapsed_ms, "Request completed");

            let name = HeaderName::from_static(SERVER_TIMING);
            let previous = res
                .headers()
                .get(&name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let value = merge_timing(previous.as_deref(), &key, elapsed_ms);
            if let Ok(value) = HeaderValue::from_str(&value) {
                res.headers_mut().insert(name, value);
            }

            Ok(res)
        })
    }
}

fn merge_timing(previous: Option<&str>, key: &str, elapsed_ms: u64) -> String {
    match previous {
        Some(previous) if !previous.trim().is_empty() => {
            format!("{}, {};dur={}", previous, key, elapsed_ms)
        }
        _ => format!("{};dur={}", key, elapsed_ms),
    }
}
