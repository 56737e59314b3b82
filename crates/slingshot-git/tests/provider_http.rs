// ABOUTME: Integration tests driving the providers over real HTTP.
// ABOUTME: A one-shot local responder records the request and replays a canned answer.

use secrecy::SecretString;
use slingshot_git::{GitError, GitHub, GitLab, GitProvider, KeyId};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

/// What the responder saw.
#[derive(Debug)]
struct RecordedRequest {
    request_line: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serve exactly one request with `status_line` and `body`, returning the base URL.
fn respond_once(status_line: &str, body: &str) -> (String, JoinHandle<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
    let base = format!("http://{}", listener.local_addr().unwrap());
    let response = format!(
        "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("should accept");
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((k, v)) = line.split_once(':') {
                headers.push((k.trim().to_string(), v.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).unwrap();

        let mut stream = stream;
        stream.write_all(response.as_bytes()).unwrap();
        stream.flush().unwrap();

        RecordedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: String::from_utf8(body).unwrap(),
        }
    });

    (base, handle)
}

fn token() -> SecretString {
    SecretString::from("test-token".to_string())
}

#[test]
fn github_add_key_sends_bearer_and_single_line_key() {
    let (base, server) = respond_once(
        "201 Created",
        r#"{"id":7,"key":"ssh-ed25519 AAAA","title":"slingshot","verified":false}"#,
    );
    let github = GitHub::with_api_base(&base).unwrap();

    let id = github
        .add_key("ssh-ed25519 AAAA slingshot\n", "slingshot", &token())
        .expect("should register key");
    assert_eq!(id, KeyId(7));

    let request = server.join().unwrap();
    assert_eq!(request.request_line, "POST /user/keys HTTP/1.1");
    assert_eq!(request.header("authorization"), Some("Bearer test-token"));
    assert_eq!(
        request.header("accept"),
        Some("application/vnd.github+json")
    );
    assert_eq!(request.header("x-github-api-version"), Some("2022-11-28"));

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["title"], "slingshot");
    assert_eq!(body["key"], "ssh-ed25519 AAAA slingshot");
}

#[test]
fn github_add_key_with_expired_token_is_auth_error() {
    let (base, server) = respond_once(
        "401 Unauthorized",
        r#"{"message":"Bad credentials","documentation_url":"https://docs.github.com/rest"}"#,
    );
    let github = GitHub::with_api_base(&base).unwrap();

    let err = github
        .add_key("ssh-ed25519 AAAA", "slingshot", &token())
        .unwrap_err();
    assert!(matches!(err, GitError::Auth { .. }));
    server.join().unwrap();
}

#[test]
fn github_remove_unknown_key_fails() {
    let (base, server) = respond_once("404 Not Found", r#"{"message":"Not Found"}"#);
    let github = GitHub::with_api_base(&base).unwrap();

    let err = github.remove_key(KeyId(999), &token()).unwrap_err();
    assert!(matches!(err, GitError::Api { .. }));

    let request = server.join().unwrap();
    assert_eq!(request.request_line, "DELETE /user/keys/999 HTTP/1.1");
}

#[test]
fn github_remove_key_on_204() {
    let (base, server) = respond_once("204 No Content", "");
    let github = GitHub::with_api_base(&base).unwrap();
    github
        .remove_key(KeyId(7), &token())
        .expect("204 should mean removed");
    server.join().unwrap();
}

#[test]
fn gitlab_add_key_uses_private_token_under_api_prefix() {
    let (base, server) = respond_once(
        "201 Created",
        r#"{"id":12,"title":"slingshot","key":"ssh-rsa AAAA","created_at":"2024-01-01T00:00:00Z","usage_type":"auth_and_signing"}"#,
    );
    let gitlab = GitLab::with_api_base(&format!("{base}/api/v4")).unwrap();

    let id = gitlab
        .add_key("ssh-rsa AAAA\r\n", "slingshot", &token())
        .expect("should register key");
    assert_eq!(id, KeyId(12));

    let request = server.join().unwrap();
    assert_eq!(request.request_line, "POST /api/v4/user/keys HTTP/1.1");
    assert_eq!(request.header("private-token"), Some("test-token"));
    assert!(request.header("authorization").is_none());

    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body["key"], "ssh-rsa AAAA");
}

#[test]
fn gitlab_remove_key_accepts_200() {
    let (base, server) = respond_once("200 OK", "{}");
    let gitlab = GitLab::with_api_base(&format!("{base}/api/v4")).unwrap();
    gitlab
        .remove_key(KeyId(12), &token())
        .expect("2xx should mean removed");

    let request = server.join().unwrap();
    assert_eq!(request.request_line, "DELETE /api/v4/user/keys/12 HTTP/1.1");
}

#[test]
fn unreachable_provider_is_transport_error() {
    let base = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let gitlab = GitLab::with_api_base(&base).unwrap();
    let err = gitlab.remove_key(KeyId(1), &token()).unwrap_err();
    assert!(matches!(err, GitError::Transport { .. }));
}
