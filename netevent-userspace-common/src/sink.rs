use anyhow::Error;
use async_trait::async_trait;

use crate::record::EventRecord;

/// Destination for drained records (stdout, files, ...).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, record: &EventRecord) -> Result<(), Error>;
    async fn flush(&self) -> Result<(), Error>;
}
