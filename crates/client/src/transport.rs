//! HTTP transport seam.
//!
//! The [`Transport`] trait is the narrow interface between the cache/feed
//! machinery and the network: a single-shot JSON fetch, and a long-lived
//! stream delivering one decoded JSON value per feed line. [`HttpTransport`]
//! implements it over reqwest; tests substitute a mock.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use seiche_core::{Error, Headers};

/// A fully-specified outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url, headers: Headers, body: Option<Value>) -> Self {
        Self { method, url, headers, body }
    }

    pub fn get(url: Url, headers: Headers) -> Self {
        Self::new(Method::GET, url, headers, None)
    }
}

/// Stream of decoded values from a long-lived feed connection.
///
/// Dropping the stream disconnects the underlying transport; that drop is
/// the only cancellation operation the feed machinery needs.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Value, Error>> + Send>>;

/// The HTTP/streaming request primitive consumed by the client.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue the request and deliver the single decoded JSON response.
    async fn fetch(&self, request: &HttpRequest) -> Result<Value, Error>;

    /// Open a long-lived streaming connection for the request.
    async fn stream(&self, request: &HttpRequest) -> Result<EventStream, Error>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build the underlying HTTP client.
    ///
    /// The timeout applies per single-shot request only; feed connections
    /// stay open until dropped.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, timeout })
    }

    fn prepare(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }
}

fn map_reqwest_err(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::Timeout } else { Error::Network(err.to_string()) }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &HttpRequest) -> Result<Value, Error> {
        let response = self
            .prepare(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http { status: status.as_u16() });
        }

        let bytes = response.bytes().await.map_err(map_reqwest_err)?;
        let value = serde_json::from_slice(&bytes)?;

        tracing::debug!(url = %request.url, status = status.as_u16(), "request completed");
        Ok(value)
    }

    async fn stream(&self, request: &HttpRequest) -> Result<EventStream, Error> {
        let response = self.prepare(request).send().await.map_err(map_reqwest_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http { status: status.as_u16() });
        }

        tracing::debug!(url = %request.url, "feed connected");
        Ok(decode_feed(response.bytes_stream()))
    }
}

/// Turn a raw byte stream into decoded feed lines.
fn decode_feed<S>(body: S) -> EventStream
where
    S: Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let state = (body.boxed(), LineDecoder::default(), false);
    Box::pin(futures_util::stream::unfold(state, |(mut body, mut decoder, mut done)| async move {
        loop {
            if let Some(line) = decoder.next_line() {
                let item = serde_json::from_slice(&line).map_err(Error::from);
                return Some((item, (body, decoder, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => decoder.extend(&chunk),
                Some(Err(err)) => {
                    done = true;
                    return Some((Err(map_reqwest_err(err)), (body, decoder, done)));
                }
                None => done = true,
            }
        }
    }))
}

/// Incremental splitter for the newline-delimited continuous feed.
///
/// CouchDB sends periodic blank lines as heartbeats; those are skipped.
#[derive(Debug, Default)]
struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().any(|b| !b.is_ascii_whitespace()) {
                return Some(line);
            }
        }
        None
    }
}
