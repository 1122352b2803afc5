//! Image source that reads relayed uploads straight from disk.

use async_trait::async_trait;
use blogpush_core::error::PublishError;
use blogpush_core::publish::{HttpImageSource, ImageSource};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::relay::UploadRelay;

/// Serves images this process is relaying from the upload directory and
/// downloads everything else.
pub struct RelayImageSource {
    relay: Arc<UploadRelay>,
    http: HttpImageSource,
}

impl RelayImageSource {
    pub fn new(relay: Arc<UploadRelay>) -> Self {
        Self {
            relay,
            http: HttpImageSource::new(),
        }
    }
}

#[async_trait]
impl ImageSource for RelayImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PublishError> {
        if let Some(path) = self.relay.resolve(url) {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    debug!("Read relayed image {} from disk", path.display());
                    return Ok(bytes);
                }
                Err(e) => warn!("Reading {} failed, downloading instead: {}", path.display(), e),
            }
        }
        self.http.fetch(url).await
    }
}
