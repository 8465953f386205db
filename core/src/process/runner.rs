use futures::stream::BoxStream;

/// One invocation of the assistant executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub prompt: String,
    pub extra_flags: Vec<String>,
    pub resume_id: Option<String>,
}

impl ExecuteRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    pub fn with_resume(mut self, resume_id: Option<String>) -> Self {
        self.resume_id = resume_id.filter(|id| !id.trim().is_empty());
        self
    }

    /// Arguments after the executable path:
    /// `[--resume <id>]? -p <prompt> <extra flags...>`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_flags.len() + 4);
        if let Some(id) = &self.resume_id {
            args.push("--resume".to_string());
            args.push(id.clone());
        }
        args.push("-p".to_string());
        args.push(self.prompt.clone());
        args.extend(self.extra_flags.iter().cloned());
        args
    }
}

/// What a turn needs from whatever runs the assistant.
///
/// [`ProcessExecutor`](super::ProcessExecutor) is the production implementation.
pub trait AssistantRunner: Send + Sync {
    /// Lazily streams the child's stdout lines, followed by at most one
    /// synthetic status/error line.
    fn execute(&self, request: ExecuteRequest) -> BoxStream<'_, String>;

    /// Synchronous and non-blocking. A no-op when nothing is running.
    fn terminate_current_process(&self);
}
