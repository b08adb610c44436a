use std::{path::PathBuf, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("failed to fetch remote image ({url}): {error}")]
    Fetch { url: String, error: reqwest::Error },
    #[error("remote image ({url}) answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("failed to decode data URL: {0}")]
    DecodeDataUrl(String),
    #[error("unrecognised image payload from {0}")]
    UnknownFormat(String),
    #[error("unsupported image source: {0}")]
    Unsupported(String),
    #[error("failed to read local image {}: {error}", path.display())]
    ReadLocal {
        path: PathBuf,
        error: std::io::Error,
    },
}

pub trait Downloader: Send + Sync {
    fn download(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ResourceError>> + Send;
}

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ResourceError::Fetch {
                url: url.to_owned(),
                error,
            })?;
        if !response.status().is_success() {
            return Err(ResourceError::Status {
                url: url.to_owned(),
                status: response.status(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|error| ResourceError::Fetch {
                url: url.to_owned(),
                error,
            })?;
        Ok(body.to_vec())
    }
}

pub fn decode_data_url(src: &str) -> Result<Vec<u8>, ResourceError> {
    let data = data_url::DataUrl::process(src)
        .map_err(|e| ResourceError::DecodeDataUrl(format!("{e:?}")))?;
    let (body, _) = data
        .decode_to_vec()
        .map_err(|e| ResourceError::DecodeDataUrl(format!("{e:?}")))?;
    Ok(body)
}
