use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sets an environment variable for the guard's lifetime.
#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }

    pub fn unset(key: &str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::remove_var(key) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(val) => unsafe { std::env::set_var(&self.key, val) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

/// Canned reply for one request path prefix.
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub enum Route {
    Json(u16, String),
    /// Respond after a delay.
    Slow(Duration, String),
}

/// Minimal HTTP/1.1 server standing in for the CMS host.
#[allow(dead_code)]
pub struct StubServer {
    pub addr: SocketAddr,
    routes: Arc<Mutex<Vec<(String, Route)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl StubServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<Vec<(String, Route)>>> = Arc::new(Mutex::new(Vec::new()));
        let hits = Arc::new(Mutex::new(Vec::new()));

        let server_routes = Arc::clone(&routes);
        let server_hits = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&server_routes);
                let hits = Arc::clone(&server_hits);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = match stream.read(&mut buf).await {
                        Ok(n) if n > 0 => n,
                        _ => return,
                    };
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let target = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    hits.lock().push(request.clone());

                    let route = routes
                        .lock()
                        .iter()
                        .find(|(prefix, _)| target.starts_with(prefix.as_str()))
                        .map(|(_, route)| route.clone());
                    let (status, body) = match route {
                        Some(Route::Json(status, body)) => (status, body),
                        Some(Route::Slow(delay, body)) => {
                            tokio::time::sleep(delay).await;
                            (200, body)
                        }
                        None => (404, r#"{"error":"not found"}"#.to_string()),
                    };
                    let _ = stream.write_all(&build_response(status, &body)).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            addr,
            routes,
            hits,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn route(&self, prefix: &str, route: Route) {
        self.routes.lock().push((prefix.to_string(), route));
    }

    /// Raw request heads received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.hits.lock().clone()
    }

    pub fn hits_for(&self, prefix: &str) -> usize {
        self.hits
            .lock()
            .iter()
            .filter(|req| {
                req.lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .is_some_and(|target| target.starts_with(prefix))
            })
            .count()
    }
}

#[allow(dead_code)]
fn build_response(status: u16, body: &str) -> Vec<u8> {
    let status_text = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    };
    format!(
        "HTTP/1.1 {status} {status_text}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}

#[allow(dead_code)]
pub fn primary_body(docs: serde_json::Value) -> String {
    serde_json::json!({ "results": docs }).to_string()
}

#[allow(dead_code)]
pub fn index_body(locale: &str, docs: serde_json::Value) -> String {
    serde_json::json!({
        "version": "1",
        "locale": locale,
        "updated": "2024-05-01T00:00:00Z",
        "docs": docs,
    })
    .to_string()
}
