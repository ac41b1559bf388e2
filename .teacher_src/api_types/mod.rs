pub mod audio;
pub mod chat_completion;
pub mod completions;
pub mod embeddings;
pub mod images;
pub mod responses;

pub use audio::{CreateSpeechRequest, CreateTranscriptionRequest, CreateTranslationRequest, Voice};
pub use chat_completion::{CreateChatCompletionPayload, Message, MessageContent, ReasoningEffort};
pub use completions::CreateCompletionPayload;
pub use embeddings::CreateEmbeddingPayload;
#[cfg(feature = "utoipa")]
pub use images::ImagesResponse;
pub use images::{
    CreateImageEditRequest, CreateImageRequest, CreateImageVariationRequest, ImageQuality,
    ImageSize,
};
pub use responses::{CreateResponsesPayload, ResponsesReasoningEffort};
