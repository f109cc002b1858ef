//! JSON-RPC over HTTP/1.1 to a single cluster endpoint.
//!
//! Every call opens its own connection. The first call on a client logs
//! in and caches the access token.
//!
//! Connecting has its own, shorter deadline. Running out of it counts as
//! the endpoint being unreachable, so the pool moves on; the overall
//! deadline only covers a peer that accepted the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use crate::client::{ClientFactory, ClusterMethod, RpcClient};
use crate::error::{RpcError, RpcResult};

const RPC_PATH: &str = "/api/v1";

/// Deadline for TCP connect plus HTTP handshake unless overridden.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

#[derive(Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct LoginResult {
    access_token: String,
}

/// Authenticated JSON-RPC client for one cluster endpoint.
pub struct HttpRpcClient {
    /// `ip:port`
    address: String,
    username: String,
    password: String,
    timeout: Duration,
    connect_timeout: Duration,
    token: Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(ip: &str, port: u16, username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            address: format!("{ip}:{port}"),
            username: username.to_string(),
            password: password.to_string(),
            timeout,
            connect_timeout: timeout.min(DEFAULT_CONNECT_TIMEOUT),
            token: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Log in on first use and cache the access token.
    async fn access_token(&self) -> RpcResult<String> {
        let mut token = self.token.lock().await;
        if let Some(t) = token.as_ref() {
            return Ok(t.clone());
        }

        let params = json!({
            "username": self.username,
            "password": self.password,
        });
        let result = self.send(ClusterMethod::UserLogin, &params, None).await?;
        let login: LoginResult =
            serde_json::from_value(result).map_err(|e| RpcError::Decode(e.to_string()))?;

        debug!(address = %self.address, "logged in to cluster endpoint");
        *token = Some(login.access_token.clone());
        Ok(login.access_token)
    }

    async fn send(
        &self,
        method: ClusterMethod,
        params: &Value,
        token: Option<&str>,
    ) -> RpcResult<Value> {
        let mut sender = self.connect().await?;

        let request = async {
            let envelope = RequestEnvelope {
                jsonrpc: "2.0",
                method: method.as_str(),
                params,
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
            };
            let body =
                serde_json::to_vec(&envelope).map_err(|e| RpcError::Decode(e.to_string()))?;

            let mut builder = http::Request::builder()
                .method("POST")
                .uri(format!("http://{}{RPC_PATH}", self.address))
                .header("host", self.address.as_str())
                .header("content-type", "application/json")
                .header("user-agent", "hgscale/0.1");
            if let Some(token) = token {
                builder = builder.header("authorization", format!("Bearer {token}"));
            }
            let req = builder
                .body(Full::new(Bytes::from(body)))
                .map_err(|e| RpcError::Http(e.to_string()))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| RpcError::Http(e.to_string()))?;

            let status = resp.status();
            let bytes = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| RpcError::Http(e.to_string()))?
                .to_bytes();

            if !status.is_success() {
                return Err(RpcError::Http(format!(
                    "{method} returned {status}: {}",
                    String::from_utf8_lossy(&bytes)
                )));
            }

            let envelope: ResponseEnvelope =
                serde_json::from_slice(&bytes).map_err(|e| RpcError::Decode(e.to_string()))?;

            match envelope.error {
                Some(err) => Err(RpcError::Remote {
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(envelope.result.unwrap_or(Value::Null)),
            }
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                endpoint: self.address.clone(),
                method: method.to_string(),
            }),
        }
    }

    /// Open a connection and complete the HTTP/1 handshake.
    async fn connect(&self) -> RpcResult<SendRequest<Full<Bytes>>> {
        let connect_err = |reason: String| RpcError::Connect {
            endpoint: self.address.clone(),
            reason,
        };

        let connecting = async {
            let stream = tokio::net::TcpStream::connect(&self.address)
                .await
                .map_err(|e| connect_err(e.to_string()))?;
            let io = hyper_util::rt::TokioIo::new(stream);
            hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| connect_err(e.to_string()))
        };

        let (sender, conn) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| connect_err(format!("no answer within {:?}", self.connect_timeout)))??;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });
        Ok(sender)
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn call(&self, method: ClusterMethod, params: Value) -> RpcResult<Value> {
        let token = self.access_token().await?;
        debug!(address = %self.address, %method, "rpc call");
        self.send(method, &params, Some(&token)).await
    }
}

/// Builds [`HttpRpcClient`]s sharing one set of credentials.
#[derive(Clone)]
pub struct HttpClientFactory {
    port: u16,
    username: String,
    password: String,
    timeout: Duration,
    connect_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(port: u16, username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            port,
            username: username.to_string(),
            password: password.to_string(),
            timeout,
            connect_timeout: timeout.min(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, endpoint: &str) -> Arc<dyn RpcClient> {
        Arc::new(
            HttpRpcClient::new(
                endpoint,
                self.port,
                &self.username,
                &self.password,
                self.timeout,
            )
            .with_connect_timeout(self.connect_timeout),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Read one HTTP request (headers + content-length body) from `stream`.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let content_length = text[..split]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    async fn respond(stream: &mut tokio::net::TcpStream, body: &str) {
        let resp = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(resp.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    }

    /// Serve `bodies` in order, one connection each; return the requests seen.
    async fn serve(bodies: Vec<&'static str>) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for body in bodies {
                let (mut stream, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut stream).await);
                respond(&mut stream, body).await;
            }
            seen
        });
        (port, handle)
    }

    #[tokio::test]
    async fn logs_in_then_calls_with_bearer_token() {
        let (port, server) = serve(vec![
            r#"{"jsonrpc":"2.0","id":1,"result":{"access_token":"tok-1","token_type":"Bearer"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"result":{"HostId<0>":{"state":"ACTIVE"}}}"#,
        ])
        .await;

        let client = HttpRpcClient::new("127.0.0.1", port, "admin", "pw", Duration::from_secs(5));
        let result = client
            .call(ClusterMethod::HostsList, json!({}))
            .await
            .unwrap();
        assert_eq!(result["HostId<0>"]["state"], "ACTIVE");

        let requests = server.await.unwrap();
        assert!(requests[0].contains("\"method\":\"user_login\""));
        assert!(requests[0].contains("\"username\":\"admin\""));
        assert!(requests[1].contains("\"method\":\"hosts_list\""));
        assert!(requests[1].to_ascii_lowercase().contains("authorization: bearer tok-1"));
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let (port, _server) = serve(vec![
            r#"{"jsonrpc":"2.0","id":1,"result":{"access_token":"t"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"host is busy"}}"#,
        ])
        .await;

        let client = HttpRpcClient::new("127.0.0.1", port, "admin", "pw", Duration::from_secs(5));
        let err = client
            .call(ClusterMethod::RemoveHost, json!({"host_id": 3}))
            .await
            .unwrap_err();
        assert!(
            matches!(err, RpcError::Remote { code: -32000, ref message } if message == "host is busy")
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = HttpRpcClient::new("127.0.0.1", port, "admin", "pw", Duration::from_secs(5));
        let err = client
            .call(ClusterMethod::HostsList, json!({}))
            .await
            .unwrap_err();
        assert!(err.is_connect(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn silent_endpoint_is_connect_error() {
        // Non-routable: the SYN is dropped or rejected, never answered.
        let client =
            HttpRpcClient::new("10.255.255.1", 14000, "admin", "pw", Duration::from_secs(30))
                .with_connect_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let err = client
            .call(ClusterMethod::HostsList, json!({}))
            .await
            .unwrap_err();
        assert!(err.is_connect(), "unexpected error: {err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn silent_endpoint_fails_over_to_next() {
        let (port, _server) = serve(vec![
            r#"{"jsonrpc":"2.0","id":1,"result":{"access_token":"t"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"result":{"HostId<1>":{"state":"ACTIVE"}}}"#,
        ])
        .await;

        let factory = HttpClientFactory::new(port, "admin", "pw", Duration::from_secs(30))
            .with_connect_timeout(Duration::from_millis(200));
        let pool = crate::pool::RpcPool::new(
            vec!["10.255.255.1".to_string(), "127.0.0.1".to_string()],
            Arc::new(factory),
        );

        let result = pool.call(ClusterMethod::HostsList, json!({})).await.unwrap();
        assert_eq!(result["HostId<1>"]["state"], "ACTIVE");
        assert_eq!(pool.candidates().await, ["127.0.0.1"]);
    }
}
