use serde_json::json;

/// Status reported when the child exits 0 without writing anything.
pub const STATUS_NO_OUTPUT_CLEAN_EXIT: &str = "no_output_clean_exit";

pub fn normalize_exit(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            code
        } else if let Some(sig) = status.signal() {
            128 + sig
        } else {
            1
        }
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(1)
    }
}

/// How a finished child run is reported on the output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit 0 and the child said something on stdout or stderr.
    Success,
    /// Exit 0 with neither stdout lines nor stderr text.
    CleanEmpty,
    ProcessError { code: i32, stderr: String },
}

impl ExitClass {
    pub fn classify(code: i32, stdout_lines: usize, stderr: &str) -> Self {
        if code != 0 {
            ExitClass::ProcessError {
                code,
                stderr: stderr.to_string(),
            }
        } else if stdout_lines == 0 && stderr.is_empty() {
            ExitClass::CleanEmpty
        } else {
            ExitClass::Success
        }
    }

    /// The synthetic line this outcome appends to the stream, if any.
    pub fn trailer(&self) -> Option<String> {
        match self {
            ExitClass::Success => None,
            ExitClass::CleanEmpty => Some(synthetic_status_line(STATUS_NO_OUTPUT_CLEAN_EXIT)),
            ExitClass::ProcessError { code, stderr } => {
                let details = if stderr.is_empty() {
                    format!("CLI process exited with code {code}.")
                } else {
                    stderr.clone()
                };
                Some(synthetic_error_line(
                    &format!("CLI process error (code {code})"),
                    Some(&details),
                ))
            }
        }
    }
}

pub fn synthetic_error_line(message: &str, details: Option<&str>) -> String {
    let mut error = json!({ "message": message });
    if let Some(details) = details {
        error["details"] = json!(details);
    }
    json!({ "type": "error", "error": error }).to_string()
}

pub fn synthetic_status_line(status: &str) -> String {
    json!({ "type": "status", "status": status }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn zero_exit_with_output_is_success() {
        assert_eq!(ExitClass::classify(0, 3, ""), ExitClass::Success);
        assert_eq!(ExitClass::classify(0, 0, "warning"), ExitClass::Success);
        assert_eq!(ExitClass::Success.trailer(), None);
    }

    #[test]
    fn zero_exit_without_output_reports_clean_empty() {
        let line = ExitClass::classify(0, 0, "").trailer().unwrap();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["type"], "status");
        assert_eq!(v["status"], "no_output_clean_exit");
    }

    #[test]
    fn nonzero_exit_carries_stderr_and_code() {
        let line = ExitClass::classify(1, 5, "boom").trailer().unwrap();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["error"]["message"], "CLI process error (code 1)");
        assert_eq!(v["error"]["details"], "boom");
    }

    #[test]
    fn nonzero_exit_without_stderr_uses_generic_details() {
        let line = ExitClass::classify(2, 0, "").trailer().unwrap();
        let v: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["error"]["details"], "CLI process exited with code 2.");
    }

    #[test]
    fn error_line_omits_missing_details() {
        let v: Value = serde_json::from_str(&synthetic_error_line("nope", None)).unwrap();
        assert_eq!(v["error"]["message"], "nope");
        assert!(v["error"].get("details").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_maps_to_128_plus_signal() {
        use std::os::unix::process::ExitStatusExt;
        // Raw wait status for "killed by SIGTERM".
        let status = std::process::ExitStatus::from_raw(libc::SIGTERM);
        assert_eq!(normalize_exit(status), 128 + libc::SIGTERM);
        let status = std::process::ExitStatus::from_raw(3 << 8);
        assert_eq!(normalize_exit(status), 3);
    }
}
