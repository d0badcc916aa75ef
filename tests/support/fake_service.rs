use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Request seen by the fake service.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct Shared {
    variables_body: Mutex<String>,
    evaluate_replies: Mutex<VecDeque<(u16, String)>>,
    evaluate_calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Local HTTP server speaking the Evaluation Service routes.
///
/// `/evaluate` answers from a queue of scripted replies and falls back to a
/// single MAE result once the queue is empty.
pub struct FakeEvaluationServer {
    url: String,
    shared: Arc<Shared>,
}

pub const PLOT_BYTES: &[u8] = b"\x89PNG fake plot";

impl FakeEvaluationServer {
    pub fn start(variables: &[&str]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake service");
        let addr = listener.local_addr().expect("fake service addr");
        let shared = Arc::new(Shared::default());
        *shared.variables_body.lock().unwrap() =
            serde_json::json!({ "variables": variables }).to_string();
        let worker = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    continue;
                };
                handle(stream, &worker);
            }
        });
        Self {
            url: format!("http://{addr}"),
            shared,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn push_evaluate_reply(&self, status: u16, body: &str) {
        self.shared
            .evaluate_replies
            .lock()
            .unwrap()
            .push_back((status, body.to_string()));
    }

    pub fn evaluate_calls(&self) -> usize {
        self.shared.evaluate_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().unwrap().clone()
    }
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let (status, content_type, body) = match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/get-variables") => (
            200,
            "application/json",
            shared.variables_body.lock().unwrap().clone().into_bytes(),
        ),
        ("POST", "/evaluate") => {
            shared.evaluate_calls.fetch_add(1, Ordering::SeqCst);
            let (status, body) = shared
                .evaluate_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(default_evaluate_reply);
            (status, "application/json", body.into_bytes())
        }
        ("GET", path) if path.starts_with("/static/") => (200, "image/png", PLOT_BYTES.to_vec()),
        _ => (
            404,
            "application/json",
            br#"{"error": "not found"}"#.to_vec(),
        ),
    };
    shared.requests.lock().unwrap().push(request);
    let head = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reason(status),
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn default_evaluate_reply() -> (u16, String) {
    let body = serde_json::json!({
        "results": { "Mean Absolute Error (MAE)": 1.25 },
        "plotUrl": "/static/plots/mae.png",
        "observationData": { "lat": [10.0, 10.5], "lon": [20.0], "values": [[1.0], [2.0]] }
    });
    (200, body.to_string())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut data = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    let header_end = loop {
        let read = stream.read(&mut buf).ok()?;
        if read == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..read]);
        if let Some(end) = find(&data, b"\r\n\r\n") {
            break end;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let length = head
        .to_ascii_lowercase()
        .lines()
        .find_map(|line| {
            line.strip_prefix("content-length:")
                .and_then(|value| value.trim().parse::<usize>().ok())
        })
        .unwrap_or(0);
    let body_start = header_end + 4;
    while data.len() < body_start + length {
        let read = stream.read(&mut buf).ok()?;
        if read == 0 {
            break;
        }
        data.extend_from_slice(&buf[..read]);
    }
    Some(RecordedRequest {
        method,
        path,
        body: data[body_start.min(data.len())..].to_vec(),
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
