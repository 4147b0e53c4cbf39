//! Durable storage for retrieved conversation recordings.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::errors::AppError;

#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Stores a conversation recording and returns where it now lives.
    async fn put_audio(&self, conversation_id: &str, audio: Bytes) -> Result<String, AppError>;
}

/// Writes recordings to S3 (or MinIO locally) under `audio/{conversation_id}.mp3`.
#[derive(Clone)]
pub struct S3AudioStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3AudioStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

pub fn audio_key(conversation_id: &str) -> String {
    let safe: String = conversation_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("audio/{safe}.mp3")
}

#[async_trait]
impl AudioStore for S3AudioStore {
    async fn put_audio(&self, conversation_id: &str, audio: Bytes) -> Result<String, AppError> {
        let key = audio_key(conversation_id);
        let size = audio.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(audio))
            .content_type("audio/mpeg")
            .send()
            .await
            .map_err(|e| AppError::S3(format!("audio upload failed: {e}")))?;

        let location = format!("s3://{}/{}", self.bucket, key);
        info!("Uploaded {size} bytes of audio to {location}");
        Ok(location)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::{audio_key, AudioStore};
    use crate::errors::AppError;

    #[derive(Default)]
    pub struct MemoryAudioStore {
        pub stored: Mutex<Vec<(String, Bytes)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl AudioStore for MemoryAudioStore {
        async fn put_audio(&self, conversation_id: &str, audio: Bytes) -> Result<String, AppError> {
            if self.fail {
                return Err(AppError::S3("bucket unavailable".to_string()));
            }
            let key = audio_key(conversation_id);
            self.stored.lock().unwrap().push((key.clone(), audio));
            Ok(format!("memory://{key}"))
        }
    }
}
