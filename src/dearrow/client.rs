use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use bytes::Bytes;
use log::{error, warn};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    StatusCode,
};
use thiserror::Error;

use super::{branding::BrandingResponse, Config};

const FAILURE_REASON_HEADER: &str = "X-Failure-Reason";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} for video {video_id}")]
    UnexpectedStatus {
        status: StatusCode,
        video_id: String,
    },

    #[error("couldn't decode branding response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("couldn't generate thumbnail (status {status}, reason {reason:?})")]
    ThumbnailUnavailable {
        status: StatusCode,
        reason: Option<String>,
    },
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Request(e) if e.is_timeout())
    }
}

/// Source of branding data and replacement thumbnails.
#[async_trait]
pub trait BrandingSource: Send + Sync {
    /// 404 is not an error; it yields a response without submissions.
    async fn fetch_branding(&self, video_id: &str) -> Result<BrandingResponse>;
    async fn fetch_thumbnail(&self, video_id: &str, timestamp: f64) -> Result<Bytes>;
}

/// Undecoded branding response, used by the lookup command.
pub struct RawBranding {
    pub status: StatusCode,
    pub url: String,
    pub body: Bytes,
}

pub struct BrandingClient {
    branding: reqwest::Client,
    thumbnail: reqwest::Client,
    branding_url: String,
    thumbnail_url: String,
    branding_timeout: Duration,
}

impl BrandingClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let branding_timeout = Duration::from_secs(config.branding_timeout_secs);
        let branding = reqwest::Client::builder()
            .timeout(branding_timeout)
            .build()
            .context("Failed to build branding client")?;

        let mut headers = HeaderMap::new();
        if let Some(key) = &config.priority_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(key).context("Invalid priority key")?,
            );
        }
        let thumbnail = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.thumbnail_timeout_secs))
            .default_headers(headers)
            .build()
            .context("Failed to build thumbnail client")?;

        Ok(Self {
            branding,
            thumbnail,
            branding_url: config.branding_url.clone(),
            thumbnail_url: config.thumbnail_url.clone(),
            branding_timeout,
        })
    }

    pub fn branding_timeout(&self) -> Duration {
        self.branding_timeout
    }

    pub async fn fetch_branding_raw(
        &self,
        video_id: &str,
        return_user_id: bool,
    ) -> Result<RawBranding> {
        let url = branding_request_url(&self.branding_url, video_id, return_user_id);
        let response = self.branding.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(RawBranding { status, url, body })
    }
}

pub fn branding_request_url(base: &str, video_id: &str, return_user_id: bool) -> String {
    format!("{base}?videoID={video_id}&returnUserID={return_user_id}")
}

pub fn thumbnail_request_url(base: &str, video_id: &str, timestamp: f64) -> String {
    format!("{base}?videoID={video_id}&time={timestamp:.5}&generateNow=true")
}

/// Interprets a branding response body by its status code.
pub fn parse_branding(status: StatusCode, body: &[u8], video_id: &str) -> Result<BrandingResponse> {
    match status {
        StatusCode::OK => Ok(serde_json::from_slice(body)?),
        // the API still reports `randomTime` and the duration along with a 404
        StatusCode::NOT_FOUND => Ok(serde_json::from_slice(body).unwrap_or_default()),
        status => Err(Error::UnexpectedStatus {
            status,
            video_id: video_id.to_string(),
        }),
    }
}

#[async_trait]
impl BrandingSource for BrandingClient {
    async fn fetch_branding(&self, video_id: &str) -> Result<BrandingResponse> {
        let raw = self.fetch_branding_raw(video_id, false).await.map_err(|e| {
            error!("Failed to request branding of {video_id} - {e:?}");
            e
        })?;

        parse_branding(raw.status, &raw.body, video_id).map_err(|e| {
            warn!("Unusable branding response for {video_id} - {e}");
            e
        })
    }

    async fn fetch_thumbnail(&self, video_id: &str, timestamp: f64) -> Result<Bytes> {
        let url = thumbnail_request_url(&self.thumbnail_url, video_id, timestamp);
        let response = self.thumbnail.get(&url).send().await.map_err(|e| {
            error!("Failed to download thumbnail {url} - {e:?}");
            e
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let reason = response
                .headers()
                .get(FAILURE_REASON_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            warn!("Thumbnail {url} is unavailable - status: {status}, reason: {reason:?}");
            return Err(Error::ThumbnailUnavailable { status, reason });
        }

        Ok(response.bytes().await?)
    }
}
