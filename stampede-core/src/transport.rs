use std::future::Future;

use stampede_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};

/// A request that never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: HttpTransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: HttpTransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<stampede_http::Error> for TransportError {
    fn from(err: stampede_http::Error) -> Self {
        Self {
            kind: err.transport_error_kind(),
            message: err.to_string(),
        }
    }
}

/// The HTTP capability the engine drives. Called concurrently from every virtual user.
///
/// Implementations must honour `req.timeout` and report its expiry as
/// [`HttpTransportErrorKind::Timeout`].
pub trait HttpTransport: Send + Sync + 'static {
    fn execute(
        &self,
        req: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

impl HttpTransport for HttpClient {
    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.request(req).await.map_err(TransportError::from)
    }
}
