use crate::emotion::{ClassificationError, EmotionClassifier, EmotionRecord};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Returns the same record for every input. Used offline and in tests.
#[derive(Clone, Debug)]
pub struct FixedEmotionClassifier {
    record: EmotionRecord,
}

impl FixedEmotionClassifier {
    pub fn new(record: EmotionRecord) -> Self {
        Self { record }
    }
}

impl EmotionClassifier for FixedEmotionClassifier {
    fn classify(&self, text: String) -> BoxFuture<'_, Result<EmotionRecord, ClassificationError>> {
        async move {
            if text.trim().is_empty() {
                return Err(ClassificationError::EmptyText);
            }
            Ok(self.record.clone())
        }
        .boxed()
    }
}
