//! Retrieval layer: turns a conversation id into durable artifacts.
//!
//! The provider needs a while after a call ends before audio and transcript exist, and
//! says so with [`NOT_READY_STATUS`](super::NOT_READY_STATUS). Those responses are retried
//! under the caller's [`RetryPolicy`]; anything else ends retrieval at once. Failures are
//! logged and reported as `None`, never raised, because the session can finish without them.

use bytes::Bytes;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::conversation::retry::{retry, RetryPolicy};
use crate::conversation::ConversationProvider;

/// Downloads the conversation recording. Persisting the bytes is the caller's job.
pub async fn fetch_audio(
    provider: &dyn ConversationProvider,
    conversation_id: &str,
    policy: &RetryPolicy,
) -> Option<Bytes> {
    let label = format!("fetch audio {conversation_id}");
    match retry(policy, &label, |_| provider.get_audio(conversation_id)).await {
        Ok(audio) => {
            info!(
                "Fetched {} bytes of audio for conversation {conversation_id}",
                audio.len()
            );
            Some(audio)
        }
        Err(e) => {
            error!("Giving up on audio for conversation {conversation_id}: {e}");
            None
        }
    }
}

/// Fetches the transcript field of the conversation document, unvalidated.
///
/// A successful response without a transcript yields `None` without further attempts.
pub async fn fetch_transcript(
    provider: &dyn ConversationProvider,
    conversation_id: &str,
    policy: &RetryPolicy,
) -> Option<Value> {
    let label = format!("fetch transcript {conversation_id}");
    let document = match retry(policy, &label, |_| provider.get_conversation(conversation_id)).await
    {
        Ok(document) => document,
        Err(e) => {
            error!("Giving up on transcript for conversation {conversation_id}: {e}");
            return None;
        }
    };

    match document.get("transcript") {
        Some(transcript) if !transcript.is_null() => {
            info!("Fetched transcript for conversation {conversation_id}");
            Some(transcript.clone())
        }
        _ => {
            warn!("Conversation {conversation_id} has no transcript");
            None
        }
    }
}

/// Best-effort, single-attempt removal of the conversation from the provider.
pub async fn delete_conversation(provider: &dyn ConversationProvider, conversation_id: &str) -> bool {
    match provider.delete_conversation(conversation_id).await {
        Ok(()) => {
            info!("Deleted conversation {conversation_id} from provider");
            true
        }
        Err(e) => {
            warn!("Failed to delete conversation {conversation_id}: {e}");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted provider double shared with the session lifecycle tests.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::Value;

    use crate::conversation::{ConversationProvider, ProviderError};

    /// What a scripted endpoint answers on one call.
    #[derive(Clone)]
    pub enum Reply<T> {
        Ok(T),
        NotReady,
        Fail(u16),
    }

    impl<T> Reply<T> {
        fn into_result(self) -> Result<T, ProviderError> {
            match self {
                Reply::Ok(v) => Ok(v),
                Reply::NotReady => Err(ProviderError::NotReady),
                Reply::Fail(status) => Err(ProviderError::Api {
                    status,
                    message: "scripted failure".to_string(),
                }),
            }
        }
    }

    /// Replays queued replies per endpoint; the last reply repeats once the queue drains.
    pub struct ScriptedProvider {
        audio: Mutex<VecDeque<Reply<Bytes>>>,
        conversation: Mutex<VecDeque<Reply<Value>>>,
        delete_ok: bool,
        pub audio_calls: AtomicU32,
        pub conversation_calls: AtomicU32,
        pub delete_calls: AtomicU32,
    }

    impl ScriptedProvider {
        pub fn new(audio: Vec<Reply<Bytes>>, conversation: Vec<Reply<Value>>) -> Self {
            Self {
                audio: Mutex::new(audio.into()),
                conversation: Mutex::new(conversation.into()),
                delete_ok: true,
                audio_calls: AtomicU32::new(0),
                conversation_calls: AtomicU32::new(0),
                delete_calls: AtomicU32::new(0),
            }
        }

        pub fn failing_delete(mut self) -> Self {
            self.delete_ok = false;
            self
        }

        fn next<T: Clone>(queue: &Mutex<VecDeque<Reply<T>>>) -> Reply<T> {
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap_or(Reply::Fail(500))
            }
        }
    }

    #[async_trait]
    impl ConversationProvider for ScriptedProvider {
        async fn get_audio(&self, _conversation_id: &str) -> Result<Bytes, ProviderError> {
            self.audio_calls.fetch_add(1, Ordering::SeqCst);
            Self::next(&self.audio).into_result()
        }

        async fn get_conversation(&self, _conversation_id: &str) -> Result<Value, ProviderError> {
            self.conversation_calls.fetch_add(1, Ordering::SeqCst);
            Self::next(&self.conversation).into_result()
        }

        async fn delete_conversation(&self, _conversation_id: &str) -> Result<(), ProviderError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.delete_ok {
                Ok(())
            } else {
                Err(ProviderError::Api {
                    status: 500,
                    message: "scripted delete failure".to_string(),
                })
            }
        }

        async fn get_signed_url(&self, agent_id: &str) -> Result<String, ProviderError> {
            Ok(format!("wss://provider.test/{agent_id}"))
        }
    }
}
