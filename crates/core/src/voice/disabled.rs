use crate::voice::{SpeechClient, SpeechRequest, SynthesisError};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;

/// Stand-in when no speech credentials are configured; every request falls back.
#[derive(Clone, Debug, Default)]
pub struct DisabledSpeechClient;

impl SpeechClient for DisabledSpeechClient {
    fn synthesize(&self, _request: SpeechRequest) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
        async { Err(SynthesisError::NotConfigured) }.boxed()
    }
}
