use crate::config::dataset::{DatasetConfig, DownloadConfig};
use crate::types::bucket::BucketKey;
use crate::update::error::DownloadError;
use async_compression::tokio::bufread::GzipDecoder;
use chrono::NaiveDateTime;
use futures_util::TryStreamExt;
use log::{info, warn};
use polars::prelude::*;
use reqwest::Client;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task;
use tokio_util::io::StreamReader;

/// What to fetch for one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub dataset: String,
    pub bucket: BucketKey,
    /// Start of the bucket (inclusive).
    pub start: NaiveDateTime,
    /// End of the bucket (exclusive).
    pub end: NaiveDateTime,
    /// Raw factor names as the provider knows them.
    pub factors: Vec<String>,
}

/// Fetches the raw data of one bucket into a file.
///
/// The target is a Parquet file the formatter rewrites in place afterwards. On error the
/// target may be left half-written; the scheduler's next cleanup removes it.
pub trait Downloader: Send + Sync {
    fn download(
        &self,
        request: &DownloadRequest,
        target: &Path,
    ) -> impl Future<Output = Result<(), DownloadError>> + Send;
}

/// Downloads a (optionally gzipped) CSV export per bucket from a templated URL and
/// stores it as Parquet.
///
/// A dataset without a [`DownloadConfig`] still gets a downloader; every download then
/// fails with [`DownloadError::NotConfigured`].
pub struct BulkCsvDownloader {
    config: Option<DownloadConfig>,
    download_client: Client,
}

impl BulkCsvDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self {
            config: Some(config),
            download_client: Client::new(),
        }
    }

    pub fn for_dataset(dataset: &DatasetConfig) -> Self {
        Self {
            config: dataset.download.clone(),
            download_client: Client::new(),
        }
    }

    /// Fills the URL template for a request, or `None` without a configured source.
    pub fn render_url(&self, request: &DownloadRequest) -> Option<String> {
        let config = self.config.as_ref()?;
        let bucket = request.bucket;
        let url = config
            .url_template
            .replace("{year}", &format!("{:04}", bucket.year()))
            .replace("{month}", &format!("{:02}", bucket.month()))
            .replace("{day}", &format!("{:02}", bucket.day()))
            .replace("{hour}", &format!("{:02}", bucket.hour()))
            .replace("{factors}", &request.factors.join(","));
        Some(url)
    }

    async fn fetch(&self, url: &str, gzip: bool) -> Result<Vec<u8>, DownloadError> {
        info!("Downloading data from {}", url);

        let response = self
            .download_client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::NetworkRequest(url.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    DownloadError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    DownloadError::NetworkRequest(url.to_string(), e)
                });
            }
        };

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let stream_reader = StreamReader::new(stream);
        let bytes = if gzip {
            read_all(GzipDecoder::new(stream_reader), url).await?
        } else {
            read_all(stream_reader, url).await?
        };
        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }

    /// Parses CSV bytes with a header row into a DataFrame on the blocking pool.
    pub(crate) async fn csv_to_dataframe(
        bytes: Vec<u8>,
        url: &str,
    ) -> Result<DataFrame, DownloadError> {
        let url = url.to_string();
        task::spawn_blocking(move || {
            let csv_io = |e| DownloadError::CsvReadIo {
                url: url.clone(),
                source: e,
            };
            let mut temp_file = NamedTempFile::new().map_err(csv_io)?;
            temp_file.write_all(&bytes).map_err(csv_io)?;
            temp_file.flush().map_err(csv_io)?;

            let csv_polars = |e| DownloadError::CsvReadPolars {
                url: url.clone(),
                source: e,
            };
            CsvReadOptions::default()
                .with_has_header(true)
                .map_parse_options(|options| options.with_try_parse_dates(true))
                .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))
                .map_err(csv_polars)?
                .finish()
                .map_err(csv_polars)
        })
        .await?
    }

    async fn write_parquet(mut df: DataFrame, path: &Path) -> Result<(), DownloadError> {
        let path_buf: PathBuf = path.to_path_buf();
        task::spawn_blocking(move || {
            let file = std::fs::File::create(&path_buf)
                .map_err(|e| DownloadError::ParquetWriteIo(path_buf.clone(), e))?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)
                .map_err(|e| DownloadError::ParquetWritePolars(path_buf, e))?;
            Ok::<(), DownloadError>(())
        })
        .await??;
        Ok(())
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R, url: &str) -> Result<Vec<u8>, DownloadError> {
    let mut buffer = Vec::new();
    reader
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| DownloadError::StreamIo(url.to_string(), e))?;
    Ok(buffer)
}

impl Downloader for BulkCsvDownloader {
    async fn download(&self, request: &DownloadRequest, target: &Path) -> Result<(), DownloadError> {
        let (Some(url), Some(config)) = (self.render_url(request), self.config.as_ref()) else {
            return Err(DownloadError::NotConfigured(request.dataset.clone()));
        };
        let raw_bytes = self.fetch(&url, config.gzip).await?;
        let df = Self::csv_to_dataframe(raw_bytes, &url).await?;
        if df.height() == 0 {
            return Err(DownloadError::Unavailable {
                bucket: request.bucket.to_string(),
                reason: format!("{} returned no rows", url),
            });
        }
        Self::write_parquet(df, target).await
    }
}
