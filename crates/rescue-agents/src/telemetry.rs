//! Session telemetry: one JSON line per escalation session.
//!
//! This is a log, not session state. Nothing reads it back at runtime.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use coordination::escalation::{AppState, TransitionRecord};

/// Summary of one session, from `start` to `completed` (or shutdown).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_state: AppState,
    pub completed: bool,
    pub elapsed_ms: u64,
    pub transitions: Vec<TransitionRecord>,
}

impl SessionRecord {
    /// States visited after `initial`, in order.
    pub fn path(&self) -> Vec<AppState> {
        self.transitions.iter().map(|t| t.to).collect()
    }

    /// Whether the session ended on the manual form path.
    pub fn used_form(&self) -> bool {
        self.transitions
            .iter()
            .any(|t| t.to == AppState::EmergencyForm)
    }
}

/// Append a session record to a JSONL file.
///
/// Failures are logged and swallowed: telemetry never affects the session.
pub fn append_session(record: &SessionRecord, path: &Path) {
    match serde_json::to_string(record) {
        Ok(json) => {
            use std::io::Write;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    warn!("Failed to create telemetry directory: {e}");
                    return;
                }
            }
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        warn!("Failed to append telemetry: {e}");
                    } else {
                        info!(path = %path.display(), session_id = %record.session_id, "Appended session telemetry");
                    }
                }
                Err(e) => warn!("Failed to open telemetry file: {e}"),
            }
        }
        Err(e) => warn!("Failed to serialize telemetry: {e}"),
    }
}

/// Read every session record from a JSONL file.
pub fn read_sessions(path: &Path) -> std::io::Result<Vec<SessionRecord>> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let reader = BufReader::new(File::open(path)?);
    let mut sessions = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: SessionRecord = serde_json::from_str(&line)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        sessions.push(record);
    }
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, to: AppState) -> SessionRecord {
        SessionRecord {
            session_id: id.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            final_state: AppState::Completed,
            completed: true,
            elapsed_ms: 4200,
            transitions: vec![TransitionRecord {
                from: AppState::EmergencyCall,
                to,
                event: "call_failed".into(),
                generation: 6,
                elapsed_ms: 4100,
                reason: None,
            }],
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("sessions.jsonl");

        append_session(&record("a", AppState::EmergencyForm), &path);
        append_session(&record("b", AppState::Completed), &path);

        let sessions = read_sessions(&path).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "a");
        assert!(sessions[0].used_form());
        assert!(!sessions[1].used_form());
        assert_eq!(sessions[1].path(), vec![AppState::Completed]);
    }

    #[test]
    fn test_corrupt_line_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        let err = read_sessions(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
