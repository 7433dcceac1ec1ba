//! Endpoint configuration.
//!
//! Both URLs are validated when the configuration is built, so a malformed
//! endpoint fails at startup instead of on the first request.

use std::env;
use std::time::Duration;

use url::Url;

use crate::{Error, Result};

/// Environment variable holding the sync service URL.
pub const POWERSYNC_URL_ENV: &str = "NEBBLER_POWERSYNC_URL";
/// Environment variable holding the backend API URL.
pub const BACKEND_URL_ENV: &str = "NEBBLER_BACKEND_URL";

const DEFAULT_UPLOAD_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_UPLOAD_FAULT_THRESHOLD: u32 = 3;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
   powersync_url: Url,
   backend_url: Url,
   /// Delay before re-attempting a failed upload when no new change arrives.
   pub upload_retry_interval: Duration,
   /// Consecutive upload failures after which the sync state shows an error.
   pub upload_fault_threshold: u32,
   pub request_timeout: Duration,
}

impl SyncConfig {
   pub fn new(powersync_url: &str, backend_url: &str) -> Result<Self> {
      Ok(Self {
         powersync_url: parse_endpoint("powersync_url", powersync_url)?,
         backend_url: parse_endpoint("backend_url", backend_url)?,
         upload_retry_interval: DEFAULT_UPLOAD_RETRY_INTERVAL,
         upload_fault_threshold: DEFAULT_UPLOAD_FAULT_THRESHOLD,
         request_timeout: DEFAULT_REQUEST_TIMEOUT,
      })
   }

   /// Read both URLs from the environment.
   pub fn from_env() -> Result<Self> {
      let powersync_url = env::var(POWERSYNC_URL_ENV)
         .map_err(|_| Error::configuration("powersync_url", format!("{POWERSYNC_URL_ENV} is not set")))?;
      let backend_url = env::var(BACKEND_URL_ENV)
         .map_err(|_| Error::configuration("backend_url", format!("{BACKEND_URL_ENV} is not set")))?;
      Self::new(&powersync_url, &backend_url)
   }

   pub fn with_upload_retry_interval(mut self, interval: Duration) -> Self {
      self.upload_retry_interval = interval;
      self
   }

   pub fn with_upload_fault_threshold(mut self, threshold: u32) -> Self {
      self.upload_fault_threshold = threshold.max(1);
      self
   }

   pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
      self.request_timeout = timeout;
      self
   }

   pub fn powersync_url(&self) -> &Url {
      &self.powersync_url
   }

   pub fn backend_url(&self) -> &Url {
      &self.backend_url
   }

   /// Backend URL with `segments` appended as path segments.
   ///
   /// Segments are percent-encoded, so table names and ids can never
   /// escape their position in the path.
   pub fn backend_endpoint(&self, segments: &[&str]) -> Result<Url> {
      let mut url = self.backend_url.clone();
      url
         .path_segments_mut()
         .map_err(|()| Error::configuration("backend_url", "cannot be used as a base URL"))?
         .pop_if_empty()
         .extend(segments);
      Ok(url)
   }
}

fn parse_endpoint(field: &'static str, value: &str) -> Result<Url> {
   let value = value.trim();
   if value.is_empty() {
      return Err(Error::configuration(field, "must not be empty"));
   }

   let url = Url::parse(value).map_err(|e| Error::configuration(field, e.to_string()))?;
   if !matches!(url.scheme(), "http" | "https") {
      return Err(Error::configuration(
         field,
         format!("unsupported scheme '{}'", url.scheme()),
      ));
   }
   if url.host_str().is_none_or(str::is_empty) {
      return Err(Error::configuration(field, "missing host"));
   }
   Ok(url)
}
