//! In-process HTTP/1.1 peer.
//!
//! Listens on `127.0.0.1:0`, counts accepted connections and records every
//! request it parses. Responses echo the request target as the body so tests
//! can tell requests apart. `PeerBehavior` switches to the failure modes the
//! chaos tests need.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

/// How the peer answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Well-formed `200 OK`, keep-alive unless the client asks to close.
    Echo,
    /// Reply with bytes that are not an HTTP response.
    Garbage,
    /// Close the connection after reading the request line.
    CloseImmediately,
    /// Promise a 100-byte body, send a few bytes, then close.
    TruncatedBody,
    /// Read the request and never answer.
    Silent,
}

/// A request as seen on the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First header with `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug)]
struct PeerState {
    behavior: PeerBehavior,
    connections: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// A running peer. The accept loop stops when this is dropped.
pub struct TestPeer {
    addr: SocketAddr,
    state: Arc<PeerState>,
    task: JoinHandle<()>,
}

impl TestPeer {
    /// Plain HTTP peer with [`PeerBehavior::Echo`].
    pub async fn start() -> Self {
        Self::start_with(PeerBehavior::Echo).await
    }

    /// Plain HTTP peer with the given behavior.
    pub async fn start_with(behavior: PeerBehavior) -> Self {
        Self::spawn(behavior, None).await
    }

    /// TLS peer presenting a fresh self-signed certificate for `localhost`.
    ///
    /// Returns the certificate so the client can trust it.
    pub async fn start_tls() -> (Self, CertificateDer<'static>) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = certified.cert.der().clone();
        let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], PrivateKeyDer::from(key))
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        (Self::spawn(PeerBehavior::Echo, Some(acceptor)).await, cert)
    }

    async fn spawn(behavior: PeerBehavior, tls: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(PeerState {
            behavior,
            connections: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let conn_state = accept_state.clone();
                let tls = tls.clone();
                tokio::spawn(async move {
                    let _ = match tls {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls_stream) => serve(tls_stream, conn_state).await,
                            Err(_) => Ok(()),
                        },
                        None => serve(stream, conn_state).await,
                    };
                });
            }
        });

        Self { addr, state, task }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// `http://127.0.0.1:{port}{path}`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Requests parsed so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for TestPeer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<S>(stream: S, state: Arc<PeerState>) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        match state.behavior {
            PeerBehavior::CloseImmediately => return Ok(()),
            PeerBehavior::Garbage => {
                reader.get_mut().write_all(b"SSH-2.0-OpenSSH_9.6\r\n\r\n").await?;
                reader.get_mut().flush().await?;
                return Ok(());
            }
            _ => {}
        }

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        let recorded = RecordedRequest {
            method,
            target,
            headers,
            body: Vec::new(),
        };
        let body = read_body(&mut reader, &recorded).await?;
        let recorded = RecordedRequest { body, ..recorded };
        let close = recorded
            .header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"));
        let echo = recorded.target.clone();
        state.requests.lock().unwrap().push(recorded);

        let stream = reader.get_mut();
        match state.behavior {
            PeerBehavior::Silent => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }
            PeerBehavior::TruncatedBody => {
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                    .await?;
                stream.flush().await?;
                return Ok(());
            }
            _ => {
                let connection = if close { "Connection: close\r\n" } else { "" };
                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n",
                    echo.len(),
                    connection
                );
                stream.write_all(head.as_bytes()).await?;
                stream.write_all(echo.as_bytes()).await?;
                stream.flush().await?;
            }
        }

        if close {
            let _ = stream.shutdown().await;
            return Ok(());
        }
    }
}

async fn read_body<R>(reader: &mut BufReader<R>, request: &RecordedRequest) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    if let Some(len) = request.header("content-length") {
        let len: usize = len.parse().unwrap_or(0);
        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        return Ok(body);
    }

    let chunked = request
        .header("transfer-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    if !chunked {
        return Ok(Vec::new());
    }

    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).await?;
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        if size == 0 {
            // Trailing CRLF after the last chunk
            let mut end = String::new();
            reader.read_line(&mut end).await?;
            return Ok(body);
        }
        let mut chunk = vec![0; size];
        reader.read_exact(&mut chunk).await?;
        body.extend_from_slice(&chunk);
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }
}
