use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

use crate::util::{has_header, host_header_value};
use crate::{Error, HttpRequest, HttpResponse, Result};

/// Pooled HTTP/1.1 client. Cheap to clone; clones share the connection pool,
/// so a single client can serve every virtual user of a run concurrently.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be tens of seconds; an unreachable target
        // should surface as a prompt `connect` error instead.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);
        http_connector.set_nodelay(true);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let inner = Client::builder(TokioExecutor::new()).build(https_connector);

        Self { inner }
    }

    /// Execute one request. `req.timeout` bounds the whole exchange, including
    /// reading the response body.
    pub async fn request(&self, req: HttpRequest) -> Result<HttpResponse> {
        match req.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.exchange(req))
                .await
                .map_err(|_| Error::Timeout(timeout))?,
            None => self.exchange(req).await,
        }
    }

    async fn exchange(&self, req: HttpRequest) -> Result<HttpResponse> {
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(req.url));
        }

        let uri: hyper::Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method).uri(uri);

        if !has_header(&req.headers, "host")
            && let Some(host) = host_header_value(&parsed)
        {
            builder = builder.header(http::header::HOST, host);
        }
        if !req.body.is_empty() && !has_header(&req.headers, "content-length") {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }

        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let request: Request<Full<Bytes>> = builder.body(Full::new(req.body))?;
        let res = self.inner.request(request).await?;

        let (parts, body) = res.into_parts();
        let status = parts.status.as_u16();
        let headers = merge_headers(&parts.headers);
        let body = body.collect().await?.to_bytes();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn merge_headers(map: &http::HeaderMap) -> Vec<(String, String)> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let v = String::from_utf8_lossy(value.as_bytes()).into_owned();
        merged
            .entry(name.as_str().to_ascii_lowercase())
            .and_modify(|cur| {
                if !cur.is_empty() {
                    cur.push_str(", ");
                }
                cur.push_str(&v);
            })
            .or_insert(v);
    }
    merged.into_iter().collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::HttpTransportErrorKind;
    use stampede_testserver::TestServer;
    use std::time::Instant;

    #[tokio::test]
    async fn unreachable_host_fails_fast_with_connect_timeout() {
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let err = client.request(req).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
        assert!(matches!(
            err.transport_error_kind(),
            HttpTransportErrorKind::Connect | HttpTransportErrorKind::Request
        ));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let client = HttpClient::default();
        let err = client
            .request(HttpRequest::get("ftp://example.com/file"))
            .await
            .unwrap_err();
        assert_eq!(
            err.transport_error_kind(),
            HttpTransportErrorKind::UnsupportedScheme
        );
    }

    #[tokio::test]
    async fn returns_status_headers_and_body() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let res = client
            .request(HttpRequest::get(server.urls().home.clone()))
            .await
            .unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(res.header("ETag"), Some(stampede_testserver::HOME_ETAG));
        assert!(res.body_utf8().is_some_and(|b| b.contains("<html")));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn slow_response_times_out_as_transport_error() {
        let server = TestServer::start().await.unwrap();
        let client = HttpClient::default();

        let req =
            HttpRequest::get(server.urls().slow.clone()).with_timeout(Duration::from_millis(5));
        let err = client.request(req).await.unwrap_err();
        assert_eq!(err.transport_error_kind(), HttpTransportErrorKind::Timeout);

        server.shutdown().await;
    }
}
