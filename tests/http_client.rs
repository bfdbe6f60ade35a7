// Drives the real reqwest transport against a wiremock server. The blocking
// client must not run on the async runtime's threads, so every client call
// happens inside `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use protecodesc_cli::cancel::CancelToken;
use protecodesc_cli::credentials::Credentials;
use protecodesc_cli::models::ScanStatus;
use protecodesc_cli::poll::PollLoop;
use protecodesc_cli::retry::{RetryExecutor, RetryPolicy};
use protecodesc_cli::transport::{HttpTransport, TransportOptions};
use protecodesc_cli::{ClientError, ScanClient};
use serde_json::json;
use wiremock::matchers::{basic_auth, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

fn client(host: &str) -> ScanClient {
    client_with_timeout(host, Duration::from_secs(5))
}

fn client_with_timeout(host: &str, timeout: Duration) -> ScanClient {
    let policy = RetryPolicy {
        unit: Duration::from_millis(1),
        ..RetryPolicy::default()
    };
    let transport = HttpTransport::new(&TransportOptions {
        timeout,
        insecure: false,
    })
    .unwrap();
    ScanClient::with_transport(
        transport,
        host,
        Credentials::new("user", "secret"),
        RetryExecutor::new(policy, CancelToken::new()),
    )
}

fn result_doc(status: &str, sha1: &str) -> serde_json::Value {
    json!({
        "results": {
            "status": status,
            "filename": "empty.bin",
            "sha1sum": sha1,
            "report_url": "https://scan.example.com/products/1/",
            "summary": {"verdict": {"short": "Pass", "detailed": "Nothing found"}},
            "components": []
        }
    })
}

async fn blocking<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_file_upload_then_poll_until_ready() {
    let server = MockServer::start().await;
    let result_path = format!("/api/app/{}/", EMPTY_SHA1);

    Mock::given(method("GET"))
        .and(path(result_path.as_str()))
        .and(basic_auth("user", "secret"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/upload/empty.bin"))
        .and(basic_auth("user", "secret"))
        .and(header("Group", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_doc("B", EMPTY_SHA1)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(result_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_doc("R", EMPTY_SHA1)))
        .with_priority(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("empty.bin");
    std::fs::File::create(&file).unwrap().flush().unwrap();

    let host = server.uri();
    let (uploaded, waited) = blocking(move || {
        let client = client(&host);
        let uploaded = client.upload(&file, None, Some(3)).unwrap();
        let waited = PollLoop::new(Duration::from_millis(10))
            .wait(&client, EMPTY_SHA1, |_| {})
            .unwrap();
        (uploaded, waited)
    })
    .await;

    assert_eq!(uploaded.status, ScanStatus::Busy);
    assert_eq!(uploaded.sha1sum.as_deref(), Some(EMPTY_SHA1));
    assert_eq!(waited.results.status, ScanStatus::Ready);
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_content_is_uploaded_once() {
    let server = MockServer::start().await;
    let content = b"same bytes";
    let sha1 = protecodesc_cli::hashing::sha1_hex(&content[..]).unwrap();
    let result_path = format!("/api/app/{}/", sha1);

    Mock::given(method("GET"))
        .and(path(result_path.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(result_path.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_doc("B", &sha1)))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result_doc("B", &sha1)))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first copy.bin");
    let second = dir.path().join("second.bin");
    std::fs::write(&first, content).unwrap();
    std::fs::write(&second, content).unwrap();

    let host = server.uri();
    blocking(move || {
        let client = client(&host);
        client.upload(&first, None, None).unwrap();
        client.upload(&second, None, None).unwrap();
    })
    .await;

    let received = server.received_requests().await.unwrap();
    let put = received
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    assert_eq!(put.url.path(), "/api/upload/first_copy.bin");
    assert_eq!(put.body, content.to_vec());
}

#[tokio::test(flavor = "multi_thread")]
async fn status_codes_surface_as_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/groups/"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/rescan/42/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/app/42/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let host = server.uri();
    let (groups, rescan, delete) = blocking(move || {
        let client = client(&host);
        (
            client.list_groups(),
            client.rescan("42"),
            client.delete("42"),
        )
    })
    .await;

    assert!(matches!(groups, Err(ClientError::InvalidLogin)));
    assert!(matches!(
        rescan,
        Err(ClientError::UnexpectedStatus { status: 500 })
    ));
    assert!(matches!(delete, Err(ClientError::ResultNotFound)));
}

#[tokio::test(flavor = "multi_thread")]
async fn listings_by_group() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/apps/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "products": [{"id": 1, "name": "a.bin"}, {"id": 2, "name": "b.zip"}]
        })))
        .mount(&server)
        .await;

    let host = server.uri();
    let apps = blocking(move || client(&host).list_apps(Some("7")).unwrap()).await;
    let names: Vec<&str> = apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a.bin", "b.zip"]);
}

#[test]
fn refused_connection_exhausts_retries() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = client(&format!("http://127.0.0.1:{}", port))
        .fetch_result("1")
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::RetriesExhausted { attempts: 3, .. }
    ));
}

fn http_reply(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Reads one request off `stream` and returns its request line.
fn read_request(stream: &mut TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();

    let mut length = 0usize;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        if line.trim_end().is_empty() {
            break;
        }
        let line = line.to_ascii_lowercase();
        if let Some(value) = line.strip_prefix("content-length:") {
            length = value.trim().parse().unwrap();
        }
        if line.starts_with("transfer-encoding:") && line.contains("chunked") {
            chunked = true;
        }
    }

    if chunked {
        loop {
            let mut size = String::new();
            reader.read_line(&mut size).unwrap();
            let size = usize::from_str_radix(size.trim(), 16).unwrap();
            let mut chunk = vec![0; size + 2];
            reader.read_exact(&mut chunk).unwrap();
            if size == 0 {
                break;
            }
        }
    } else {
        let mut body = vec![0; length];
        reader.read_exact(&mut body).unwrap();
    }
    request_line.trim_end().to_string()
}

/// Serves one connection per canned reply, each after its delay, then stops
/// listening. The handle yields the request lines in arrival order.
fn canned_server(replies: Vec<(Duration, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for (delay, reply) in replies {
            let (mut stream, _) = listener.accept().unwrap();
            seen.push(read_request(&mut stream));
            thread::sleep(delay);
            let _ = stream.write_all(reply.as_bytes());
            let _ = stream.flush();
        }
        seen
    });
    (host, handle)
}

#[test]
fn cut_short_upload_reply_is_not_sent_again() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("router.bin");
    std::fs::write(&file, b"firmware image").unwrap();
    let sha1 = protecodesc_cli::hashing::file_sha1(&file).unwrap();
    let stored = result_doc("B", &sha1).to_string();

    let truncated = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\nConnection: close\r\n\r\n{\"results\":";
    let (host, server) = canned_server(vec![
        (Duration::ZERO, http_reply("404 Not Found", "{}")),
        (Duration::ZERO, truncated.to_string()),
        (Duration::ZERO, http_reply("200 OK", &stored)),
    ]);

    let uploaded = client(&host).upload(&file, None, None).unwrap();
    let seen = server.join().unwrap();

    assert_eq!(uploaded.sha1sum.as_deref(), Some(sha1.as_str()));
    assert_eq!(seen.len(), 3);
    assert_eq!(seen.iter().filter(|line| line.starts_with("PUT ")).count(), 1);
    assert!(seen[2].starts_with(&format!("GET /api/app/{}/", sha1)));
}

#[test]
fn slow_upload_reply_outlasts_request_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("empty.bin");
    std::fs::File::create(&file).unwrap();
    let stored = result_doc("B", EMPTY_SHA1).to_string();

    let (host, server) = canned_server(vec![
        (Duration::ZERO, http_reply("404 Not Found", "{}")),
        (Duration::from_millis(600), http_reply("200 OK", &stored)),
    ]);

    let uploaded = client_with_timeout(&host, Duration::from_millis(200))
        .upload(&file, None, None)
        .unwrap();
    server.join().unwrap();
    assert_eq!(uploaded.sha1sum.as_deref(), Some(EMPTY_SHA1));
}

#[test]
fn slow_lookup_hits_request_deadline() {
    let (host, server) = canned_server(vec![(
        Duration::from_millis(600),
        http_reply("200 OK", &result_doc("R", EMPTY_SHA1).to_string()),
    )]);

    let err = client_with_timeout(&host, Duration::from_millis(200))
        .fetch_result(EMPTY_SHA1)
        .unwrap_err();
    server.join().unwrap();
    assert!(matches!(
        err,
        ClientError::RetriesExhausted { attempts: 3, .. }
    ));
}
