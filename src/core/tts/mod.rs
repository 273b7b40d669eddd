pub mod base;
pub mod edge;

pub use base::{BoundaryMode, TTSError, TTSResult, TtsEvent};
pub use edge::{
    Communicate, Drm, EdgeTtsClient, SynthesisConfig, Voice, VoiceFilter, VoicesManager,
    list_voices,
};
