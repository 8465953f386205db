use crate::process::ExecuteRequest;

const USER_MESSAGE_TAG: &str = "current_user_message_for_this_turn";

/// Wraps the user's text the way the assistant is told to expect it, so the
/// current message stays distinct from resumed history.
pub fn wrap_user_message(message: &str) -> String {
    format!("\n<{USER_MESSAGE_TAG}>\n{message}\n</{USER_MESSAGE_TAG}>\n")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    pub extra_flags: Vec<String>,
    pub resume_id: Option<String>,
}

impl TurnRequest {
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
        self.resume_id = resume_id;
        self
    }

    pub(crate) fn to_execute_request(&self) -> ExecuteRequest {
        ExecuteRequest::new(wrap_user_message(&self.prompt))
            .with_flags(self.extra_flags.clone())
            .with_resume(self.resume_id.clone())
    }
}

/// Outcome of one turn. A cancelled turn still carries what streamed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnResult {
    pub session_id: Option<String>,
    pub text: String,
    pub spoke: bool,
    pub cancelled: bool,
}

/// Live progress of a turn, for rendering while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    AssistantText(String),
    SessionId(String),
    McpServers {
        connected: Vec<String>,
        failed: Vec<String>,
    },
    Status(String),
}
