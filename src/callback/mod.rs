//! Asynchronous callback reception and verification

pub mod auth;
pub mod server;
pub mod signal;
pub mod signature;

pub use auth::{AuthConfig, Authenticator};
pub use server::{CallbackListener, CallbackSource, ListenerOptions, ReceiveError, TlsFiles};
pub use signal::{Signal, DEFAULT_ID_FIELD};
pub use signature::{Algorithm, SignatureConfig, SignatureError, SignatureVerifier, TIMESTAMP_HEADER};
