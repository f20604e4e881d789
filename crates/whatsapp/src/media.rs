use async_trait::async_trait;
use comanda_core::domain::tenant::Tenant;

use crate::channel::ChannelError;

/// Turns a voice note into text. `Ok(None)` means the deployment cannot
/// transcribe and the customer should be asked to type instead.
#[async_trait]
pub trait MediaTranscriber: Send + Sync {
    async fn transcribe(&self, tenant: &Tenant, media_id: &str)
        -> Result<Option<String>, ChannelError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTranscriber;

#[async_trait]
impl MediaTranscriber for NoopTranscriber {
    async fn transcribe(
        &self,
        _tenant: &Tenant,
        _media_id: &str,
    ) -> Result<Option<String>, ChannelError> {
        Ok(None)
    }
}
