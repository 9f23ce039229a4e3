//! Fake quest backend for tests: a `tiny_http` server on a loopback port
//! that records every request and answers from a caller-supplied router.

use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::Value;
use tiny_http::{Header, Response, Server};

/// A request as the fake backend saw it.
#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    /// Path plus query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or(Value::Null)
    }
}

/// Canned answer produced by a router.
pub struct Canned {
    status: u16,
    body: String,
    content_type: &'static str,
}

impl Canned {
    pub fn json(status: u16, body: Value) -> Self {
        Canned {
            status,
            body: body.to_string(),
            content_type: "application/json",
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Canned {
            status,
            body: body.to_string(),
            content_type: "text/html",
        }
    }

    pub fn event_stream(body: &str) -> Self {
        Canned {
            status: 200,
            body: body.to_string(),
            content_type: "text/event-stream",
        }
    }
}

pub struct FakeBackend {
    port: u16,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeBackend {
    pub fn start<F>(router: F) -> Self
    where
        F: Fn(&Recorded) -> Canned + Send + Sync + 'static,
    {
        let server = Server::http("127.0.0.1:0").expect("bind fake backend");
        let port = server
            .server_addr()
            .to_ip()
            .expect("fake backend listens on TCP")
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = requests.clone();

        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let recorded = Recorded {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    headers: request
                        .headers()
                        .iter()
                        .map(|h| {
                            (h.field.as_str().as_str().to_string(), h.value.as_str().to_string())
                        })
                        .collect(),
                    body,
                };
                let canned = router(&recorded);
                log.lock().expect("request log").push(recorded);

                let header =
                    Header::from_bytes(&b"Content-Type"[..], canned.content_type.as_bytes())
                        .expect("content-type header");
                let response = Response::from_string(canned.body)
                    .with_status_code(canned.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        FakeBackend { port, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("request log").clone()
    }

    pub fn last_request(&self) -> Option<Recorded> {
        self.requests().pop()
    }

    /// Number of recorded requests matching `method` and exact `url`.
    pub fn count(&self, method: &str, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}
