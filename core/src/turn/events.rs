use serde_json::Value;

/// One decoded line of the assistant's stream-json output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    /// Any event may carry the conversation's session id.
    pub session_id: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpServerStatus {
    pub name: String,
    pub status: String,
}

impl McpServerStatus {
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    pub fn is_connected(&self) -> bool {
        !matches!(self.status.as_str(), "failed" | "error")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `{"type":"assistant","message":{"content":[{"type":"text","text":..}]}}`
    AssistantText(Vec<String>),
    /// `{"type":"result","subtype":"success","result":".."}`
    Result {
        subtype: Option<String>,
        text: Option<String>,
    },
    /// Reported by the child or synthesized by the executor.
    Error {
        message: String,
        details: Option<String>,
    },
    Status(String),
    /// `{"type":"system","subtype":"init","mcp_servers":[..]}`
    SystemInit { mcp_servers: Vec<McpServerStatus> },
    /// Anything else, keyed by its `type` (empty when missing).
    Other(String),
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(|x| x.as_str())
}

/// Decodes one stdout line. Only invalid JSON is an error; unknown shapes
/// come back as [`EventKind::Other`].
pub fn decode_event(line: &str) -> Result<StreamEvent, serde_json::Error> {
    let v: Value = serde_json::from_str(line.trim())?;

    let session_id = str_field(&v, "session_id")
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());
    let ty = str_field(&v, "type").unwrap_or_default();

    let kind = match ty {
        "assistant" => {
            let parts = v
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter(|item| str_field(item, "type") == Some("text"))
                        .filter_map(|item| str_field(item, "text"))
                        .filter(|text| !text.is_empty())
                        .map(|text| text.to_string())
                        .collect()
                })
                .unwrap_or_default();
            EventKind::AssistantText(parts)
        }
        "result" => EventKind::Result {
            subtype: str_field(&v, "subtype").map(|s| s.to_string()),
            text: str_field(&v, "result").map(|s| s.to_string()),
        },
        "error" => {
            let error = v.get("error");
            let message = error
                .and_then(|e| e.as_str().or_else(|| str_field(e, "message")))
                .or_else(|| str_field(&v, "message"))
                .unwrap_or("Unknown error from assistant CLI")
                .to_string();
            let details = error
                .and_then(|e| str_field(e, "details"))
                .filter(|d| !d.is_empty())
                .map(|d| d.to_string());
            EventKind::Error { message, details }
        }
        "status" => EventKind::Status(str_field(&v, "status").unwrap_or_default().to_string()),
        "system" if str_field(&v, "subtype") == Some("init") => {
            let mcp_servers = v
                .get("mcp_servers")
                .and_then(|s| s.as_array())
                .map(|servers| {
                    servers
                        .iter()
                        .map(|s| McpServerStatus {
                            name: str_field(s, "name").unwrap_or("unknown").to_string(),
                            status: str_field(s, "status").unwrap_or_default().to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            EventKind::SystemInit { mcp_servers }
        }
        other => EventKind::Other(other.to_string()),
    };

    Ok(StreamEvent { session_id, kind })
}
