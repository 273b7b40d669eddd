pub mod subtitles;
pub mod tts;

// Re-export commonly used types for convenience
pub use tts::{
    BoundaryMode, Communicate, Drm, EdgeTtsClient, SynthesisConfig, TTSError, TTSResult, TtsEvent,
    Voice, VoiceFilter, VoicesManager, list_voices,
};

pub use subtitles::{SubMaker, SubtitleError};
