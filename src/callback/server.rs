//! Callback listener
//!
//! An axum server that accepts callback POSTs for the lifetime of a suite.
//! Each request is decoded into a [`Signal`] and handed to the waiting step
//! through a capacity-one channel; the handler holds the HTTP response until
//! the handoff has happened, so senders are naturally paced by the consumer.
//! With [`TlsFiles`] set, the same router is served over HTTPS.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::serve::Listener;
use axum::Router;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::pem::PemObject;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use super::auth::Authenticator;
use super::signal::Signal;
use crate::common::{Error, Result};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {
    #[error("deadline exceeded while waiting for callback")]
    DeadlineExceeded,

    #[error("callback listener is closed")]
    Closed,
}

/// Where the executor pulls callbacks from
#[async_trait]
pub trait CallbackSource: Send + Sync {
    /// Wait for the next callback, giving up at `deadline`
    async fn receive(&self, deadline: Instant) -> std::result::Result<Signal, ReceiveError>;
}

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub host: String,
    pub port: u16,
    pub route: String,
    /// Top-level body field holding the correlation id
    pub id_field: String,
    pub shutdown_timeout: Duration,
    pub tls: Option<TlsFiles>,
}

/// PEM certificate chain and private key for HTTPS callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

impl TlsFiles {
    fn acceptor(&self) -> Result<TlsAcceptor> {
        let cert_error = |e: &dyn fmt::Display| Error::ListenerTls(format!("{}: {}", self.cert_file.display(), e));
        let certs = CertificateDer::pem_file_iter(&self.cert_file)
            .map_err(|e| cert_error(&e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| cert_error(&e))?;
        if certs.is_empty() {
            return Err(cert_error(&"no certificates found"));
        }

        let key = PrivateKeyDer::from_pem_file(&self.key_file)
            .map_err(|e| Error::ListenerTls(format!("{}: {}", self.key_file.display(), e)))?;

        let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .and_then(|builder| builder.with_no_client_auth().with_single_cert(certs, key))
            .map_err(|e| Error::ListenerTls(e.to_string()))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

/// TCP listener that yields connections only after a completed TLS handshake
struct TlsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, peer) = Listener::accept(&mut self.tcp).await;
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.acceptor.accept(stream)).await {
                Ok(Ok(tls)) => return (tls, peer),
                Ok(Err(e)) => tracing::debug!(%peer, "TLS handshake failed: {}", e),
                Err(_) => tracing::debug!(%peer, "TLS handshake timed out"),
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.tcp.local_addr()
    }
}

async fn serve<L>(listener: L, app: Router, shutdown: oneshot::Receiver<()>) -> std::io::Result<()>
where
    L: Listener,
    L::Addr: fmt::Debug,
{
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await;
    if let Err(e) = &result {
        tracing::error!("Callback listener failed: {}", e);
    }
    result
}

/// Receiving half of the handoff
struct Inbox {
    rx: Mutex<mpsc::Receiver<Signal>>,
}

impl Inbox {
    async fn close(&self) {
        self.rx.lock().await.close();
    }
}

#[async_trait]
impl CallbackSource for Inbox {
    async fn receive(&self, deadline: Instant) -> std::result::Result<Signal, ReceiveError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(signal)) => Ok(signal),
            Ok(None) => Err(ReceiveError::Closed),
            Err(_) => Err(ReceiveError::DeadlineExceeded),
        }
    }
}

#[derive(Clone)]
struct HandlerState {
    tx: mpsc::Sender<Signal>,
    authenticator: Arc<dyn Authenticator>,
    id_field: Arc<str>,
}

async fn handle_callback(
    State(state): State<HandlerState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !state.authenticator.authenticate(&headers) {
        tracing::warn!("Rejected unauthenticated callback");
        return StatusCode::UNAUTHORIZED;
    }

    let signal = Signal::decode(headers, body, &state.id_field);
    match &signal.error {
        Some(e) => tracing::warn!(error = %e, "Received undecodable callback"),
        None => tracing::debug!(callback_id = %signal.callback_id, "Received callback"),
    }

    match state.tx.send(signal).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// A running callback server
pub struct CallbackListener {
    addr: SocketAddr,
    inbox: Arc<Inbox>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
    shutdown_timeout: Duration,
}

impl CallbackListener {
    /// Bind and start serving; returns once the socket accepts connections
    pub async fn start(options: ListenerOptions, authenticator: Arc<dyn Authenticator>) -> Result<Self> {
        let acceptor = options.tls.as_ref().map(TlsFiles::acceptor).transpose()?;

        let bind_addr = format!("{}:{}", options.host, options.port);
        let listener = TcpListener::bind(bind_addr.as_str())
            .await
            .map_err(|source| Error::ListenerBind {
                addr: bind_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| Error::ListenerBind {
            addr: bind_addr.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(1);
        let state = HandlerState {
            tx,
            authenticator,
            id_field: Arc::from(options.id_field.as_str()),
        };
        let app = Router::new()
            .route(&options.route, post(handle_callback))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (scheme, handle) = match acceptor {
            Some(acceptor) => {
                let listener = TlsListener { tcp: listener, acceptor };
                ("https", tokio::spawn(serve(listener, app, shutdown_rx)))
            }
            None => ("http", tokio::spawn(serve(listener, app, shutdown_rx))),
        };

        tracing::info!("Callback listener on {}://{}{}", scheme, addr, options.route);

        Ok(Self {
            addr,
            inbox: Arc::new(Inbox { rx: Mutex::new(rx) }),
            shutdown: shutdown_tx,
            handle,
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn source(&self) -> Arc<dyn CallbackSource> {
        self.inbox.clone()
    }

    /// Close the handoff and drain the server within the shutdown timeout
    pub async fn stop(self) -> Result<()> {
        self.inbox.close().await;
        let _ = self.shutdown.send(());

        match tokio::time::timeout(self.shutdown_timeout, self.handle).await {
            Err(_) => Err(Error::ListenerShutdownTimeout(self.shutdown_timeout.as_secs())),
            Ok(Err(join)) => Err(Error::Internal(format!("Callback listener task failed: {}", join))),
            Ok(Ok(result)) => {
                result?;
                tracing::debug!("Callback listener stopped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::auth::{ApiKeyAuthenticator, NoopAuthenticator};
    use crate::callback::DEFAULT_ID_FIELD;
    use tokio::io::AsyncWriteExt;

    fn options() -> ListenerOptions {
        ListenerOptions {
            host: "127.0.0.1".to_string(),
            port: 0,
            route: "/callback".to_string(),
            id_field: DEFAULT_ID_FIELD.to_string(),
            shutdown_timeout: Duration::from_secs(3),
            tls: None,
        }
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tls").join(name)
    }

    fn tls_files() -> TlsFiles {
        TlsFiles {
            cert_file: fixture("cert.pem"),
            key_file: fixture("key.pem"),
        }
    }

    fn url(listener: &CallbackListener) -> String {
        format!("http://{}/callback", listener.local_addr())
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_delivers_callbacks_in_order() {
        let listener = CallbackListener::start(options(), Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let source = listener.source();
        let target = url(&listener);

        let sender = tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut statuses = Vec::new();
            for id in ["cb-1", "cb-2"] {
                let response = client
                    .post(&target)
                    .body(format!(r#"{{"callback_id":"{}"}}"#, id))
                    .send()
                    .await
                    .unwrap();
                statuses.push(response.status().as_u16());
            }
            statuses
        });

        assert_eq!(source.receive(soon()).await.unwrap().callback_id, "cb-1");
        assert_eq!(source.receive(soon()).await.unwrap().callback_id, "cb-2");
        assert_eq!(sender.await.unwrap(), vec![200, 200]);

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_json_body_arrives_with_error() {
        let listener = CallbackListener::start(options(), Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let response = reqwest::Client::new()
            .post(url(&listener))
            .body("definitely not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let signal = listener.source().receive(soon()).await.unwrap();
        assert!(signal.has_error());
        assert_eq!(signal.body.as_ref(), b"definitely not json");

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthenticated_is_rejected() {
        let auth = Arc::new(ApiKeyAuthenticator::new("X-Api-Key", "k"));
        let listener = CallbackListener::start(options(), auth).await.unwrap();
        let client = reqwest::Client::new();

        let rejected = client
            .post(url(&listener))
            .body(r#"{"callback_id":"cb-1"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status().as_u16(), 401);

        let accepted = client
            .post(url(&listener))
            .header("X-Api-Key", "k")
            .body(r#"{"callback_id":"cb-2"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status().as_u16(), 200);

        // The rejected request never reached the inbox
        let signal = listener.source().receive(soon()).await.unwrap();
        assert_eq!(signal.callback_id, "cb-2");

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_deadline_leaves_listener_running() {
        let listener = CallbackListener::start(options(), Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let source = listener.source();

        let deadline = Instant::now() + Duration::from_millis(50);
        assert_eq!(source.receive(deadline).await.unwrap_err(), ReceiveError::DeadlineExceeded);

        reqwest::Client::new()
            .post(url(&listener))
            .body(r#"{"callback_id":"late"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(source.receive(soon()).await.unwrap().callback_id, "late");

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_inbox_answers_503() {
        let listener = CallbackListener::start(options(), Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let source = listener.source();
        listener.inbox.close().await;

        let response = reqwest::Client::new()
            .post(url(&listener))
            .body(r#"{"callback_id":"cb-1"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 503);
        assert_eq!(source.receive(soon()).await.unwrap_err(), ReceiveError::Closed);

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = CallbackListener::start(options(), Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let taken = ListenerOptions {
            port: first.local_addr().port(),
            ..options()
        };
        let err = CallbackListener::start(taken, Arc::new(NoopAuthenticator))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ListenerBind { .. }));

        first.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_callback_waits_for_consumer() {
        let listener = CallbackListener::start(options(), Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let source = listener.source();
        let client = reqwest::Client::new();
        let target = url(&listener);
        let post = |id: &str| {
            let request = client
                .post(target.as_str())
                .body(format!(r#"{{"callback_id":"{}"}}"#, id));
            async move { request.send().await.unwrap().status().as_u16() }
        };

        // The first callback fills the one-slot buffer
        assert_eq!(post("cb-1").await, 200);

        let mut second = tokio::spawn(post("cb-2"));
        assert!(
            tokio::time::timeout(Duration::from_millis(200), &mut second)
                .await
                .is_err(),
            "second callback must stay pending while the buffer is full"
        );

        assert_eq!(source.receive(soon()).await.unwrap().callback_id, "cb-1");
        assert_eq!(second.await.unwrap(), 200);
        assert_eq!(source.receive(soon()).await.unwrap().callback_id, "cb-2");

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_times_out_on_stuck_request() {
        let quick = ListenerOptions {
            shutdown_timeout: Duration::from_millis(100),
            ..options()
        };
        let listener = CallbackListener::start(quick, Arc::new(NoopAuthenticator))
            .await
            .unwrap();

        // Headers promise a body that never finishes arriving
        let mut stuck = TcpStream::connect(listener.local_addr()).await.unwrap();
        stuck
            .write_all(b"POST /callback HTTP/1.1\r\nHost: localhost\r\nContent-Length: 100\r\n\r\n{")
            .await
            .unwrap();
        stuck.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let err = listener.stop().await.unwrap_err();
        assert!(matches!(err, Error::ListenerShutdownTimeout(_)), "{:?}", err);
        drop(stuck);
    }

    #[tokio::test]
    async fn test_custom_id_field_is_read() {
        let custom = ListenerOptions {
            id_field: "immune_callback_id".to_string(),
            ..options()
        };
        let listener = CallbackListener::start(custom, Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        reqwest::Client::new()
            .post(url(&listener))
            .body(r#"{"immune_callback_id":"cb-7"}"#)
            .send()
            .await
            .unwrap();

        let signal = listener.source().receive(soon()).await.unwrap();
        assert!(!signal.has_error());
        assert_eq!(signal.callback_id, "cb-7");

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_serves_callbacks_over_tls() {
        let secure = ListenerOptions {
            tls: Some(tls_files()),
            ..options()
        };
        let listener = CallbackListener::start(secure, Arc::new(NoopAuthenticator))
            .await
            .unwrap();
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap();

        let response = client
            .post(format!("https://{}/callback", listener.local_addr()))
            .body(r#"{"callback_id":"cb-tls"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(listener.source().receive(soon()).await.unwrap().callback_id, "cb-tls");

        // Plain HTTP is not answered on a TLS listener
        let plain = client
            .post(format!("http://{}/callback", listener.local_addr()))
            .timeout(Duration::from_secs(2))
            .body(r#"{"callback_id":"cb-plain"}"#)
            .send()
            .await;
        assert!(plain.is_err());

        listener.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_tls_material_fails_before_bind() {
        let missing_cert = ListenerOptions {
            tls: Some(TlsFiles {
                cert_file: fixture("absent.pem"),
                ..tls_files()
            }),
            ..options()
        };
        let err = CallbackListener::start(missing_cert, Arc::new(NoopAuthenticator))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ListenerTls(ref m) if m.contains("absent.pem")), "{:?}", err);

        let key_as_cert = ListenerOptions {
            tls: Some(TlsFiles {
                key_file: fixture("cert.pem"),
                ..tls_files()
            }),
            ..options()
        };
        let err = CallbackListener::start(key_as_cert, Arc::new(NoopAuthenticator))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::ListenerTls(_)), "{:?}", err);
    }
}
