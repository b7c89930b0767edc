use hyper::body::{Body, Bytes};
use hyper::client::connect::Connect;
use hyper::client::{Client, HttpConnector};
use hyper::http::uri::Uri;
use hyper::StatusCode;
use hyper_tls::HttpsConnector;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    #[error(transparent)]
    Http(#[from] hyper::http::Error),
    #[error("Non-success status code: {0}")]
    NonSuccess(StatusCode),
    #[error("Gave up after {0} redirects")]
    TooManyRedirects(usize),
    #[error("Download did not finish in {0:?}")]
    Timeout(Duration),
}

impl From<StatusCode> for SourceError {
    fn from(status_code: StatusCode) -> Self {
        SourceError::NonSuccess(status_code)
    }
}

/// Where the compressed range dataset comes from
pub trait RangeSource: fmt::Display + Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Bytes, SourceError>> + Send;
}

pub struct HttpSource<C = HttpsConnector<HttpConnector>> {
    client: Client<C>,
    uri: Uri,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(uri: Uri, timeout: Duration) -> Self {
        let https = HttpsConnector::new();
        let client = Client::builder().build::<_, Body>(https);
        Self::with_client(client, uri, timeout)
    }
}

impl<C> HttpSource<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    pub fn with_client(client: Client<C>, uri: Uri, timeout: Duration) -> Self {
        Self {
            client,
            uri,
            timeout,
        }
    }

    async fn download(&self) -> Result<Bytes, SourceError> {
        const MAX_REDIRECTS: usize = 8;
        let mut uri = self.uri.clone();
        let mut redirects = 0;
        let response = loop {
            let request = hyper::Request::builder().uri(&uri).body(Body::empty())?;
            let response = self.client.request(request).await?;

            if response.status().is_success() {
                break response;
            } else if response.status().is_redirection() {
                uri = response
                    .headers()
                    .get(hyper::header::LOCATION)
                    .ok_or_else(|| response.status())?
                    .as_bytes()
                    .try_into()
                    .map_err(|_| response.status())?;
            } else {
                return Err(response.status().into());
            }

            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(SourceError::TooManyRedirects(MAX_REDIRECTS));
            }
        };
        Ok(hyper::body::to_bytes(response.into_body()).await?)
    }
}

impl<C> fmt::Display for HttpSource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

impl<C> RangeSource for HttpSource<C>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    fn fetch(&self) -> impl Future<Output = Result<Bytes, SourceError>> + Send {
        async move {
            tokio::time::timeout(self.timeout, self.download())
                .await
                .map_err(|_| SourceError::Timeout(self.timeout))?
        }
    }
}
