use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

/// HTTP methods the route table distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
            Method::Put => write!(f, "PUT"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A parsed request as delivered by the external HTTP server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Parse the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// The response a handler produces.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Extra headers (redirects, caching)
    pub headers: Vec<(&'static str, String)>,
}

impl Response {
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
        Self {
            status,
            content_type: "application/json",
            body,
            headers: Vec::new(),
        }
    }

    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        Self::json(200, value)
    }

    /// Conventional `{error, status}` envelope.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message, "status": status }))
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            content_type: "text/plain",
            body: Vec::new(),
            headers: vec![("Location", location.to_string())],
        }
    }

    pub fn static_asset(content_type: &'static str, body: &'static str) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.as_bytes().to_vec(),
            headers: vec![("Cache-Control", "public, max-age=31536000".to_string())],
        }
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// Route table binding (method, path) pairs to handlers.
///
/// Exact paths match first; a single trailing-wildcard form
/// (`/api/plugins/*`) covers parameterized routes. Unmatched GETs fall to
/// the optional fallback (the captive portal's redirect).
pub struct Router {
    routes: HashMap<(Method, String), Handler>,
    prefixes: Vec<(Method, String, Handler)>,
    fallback: Option<Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            prefixes: Vec::new(),
            fallback: None,
        }
    }

    pub fn route<F, Fut>(&mut self, method: Method, path: &str, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |req| Box::pin(handler(req)));
        if let Some(prefix) = path.strip_suffix("/*") {
            self.prefixes.push((method, prefix.to_string(), handler));
        } else {
            self.routes.insert((method, path.to_string()), handler);
        }
    }

    pub fn set_fallback<F, Fut>(&mut self, handler: F)
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.fallback = Some(Arc::new(move |req| Box::pin(handler(req))));
    }

    /// Dispatch a request to its handler.
    pub async fn dispatch(&self, request: Request) -> Response {
        if let Some(handler) = self.routes.get(&(request.method, request.path.clone())) {
            return handler(request).await;
        }

        let prefix_handler = self
            .prefixes
            .iter()
            .find(|(method, prefix, _)| {
                *method == request.method && request.path.starts_with(prefix.as_str())
            })
            .map(|(_, _, handler)| Arc::clone(handler));
        if let Some(handler) = prefix_handler {
            return handler(request).await;
        }

        if request.method == Method::Get {
            if let Some(fallback) = &self.fallback {
                return fallback(request).await;
            }
        }

        Response::error(404, "Not found")
    }

    pub fn route_count(&self) -> usize {
        self.routes.len() + self.prefixes.len()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_route_dispatch() {
        let mut router = Router::new();
        router.route(Method::Get, "/api/status", |_req| async {
            Response::ok_json(&json!({"ok": true}))
        });

        let response = router.dispatch(Request::new(Method::Get, "/api/status")).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body_json()["ok"], true);

        // Wrong method misses
        let response = router.dispatch(Request::new(Method::Post, "/api/status")).await;
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_prefix_route() {
        let mut router = Router::new();
        router.route(Method::Post, "/api/plugins/*", |req| async move {
            let name = req.path.trim_start_matches("/api/plugins/").to_string();
            Response::ok_json(&json!({ "name": name }))
        });

        let response = router
            .dispatch(Request::new(Method::Post, "/api/plugins/clock"))
            .await;
        assert_eq!(response.body_json()["name"], "clock");
    }

    #[tokio::test]
    async fn test_get_fallback() {
        let mut router = Router::new();
        router.set_fallback(|_req| async { Response::redirect("http://192.168.4.1/config") });

        let response = router.dispatch(Request::new(Method::Get, "/anything")).await;
        assert_eq!(response.status, 302);
        assert_eq!(response.headers[0].1, "http://192.168.4.1/config");

        // POST does not fall through to the portal redirect
        let response = router.dispatch(Request::new(Method::Post, "/anything")).await;
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_error_envelope() {
        let response = Response::error(413, "Image too large");
        assert_eq!(response.status, 413);
        let body = response.body_json();
        assert_eq!(body["error"], "Image too large");
        assert_eq!(body["status"], 413);
    }
}
