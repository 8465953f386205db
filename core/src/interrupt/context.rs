use std::fmt;

/// What the application is doing when CTRL+C arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterruptContext {
    #[default]
    Idle,
    TtsPlaying,
    SttListening,
    Processing,
}

impl InterruptContext {
    pub fn as_str(self) -> &'static str {
        match self {
            InterruptContext::Idle => "idle",
            InterruptContext::TtsPlaying => "tts_playing",
            InterruptContext::SttListening => "stt_listening",
            InterruptContext::Processing => "processing",
        }
    }
}

impl fmt::Display for InterruptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
