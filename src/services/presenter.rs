//! Result presenter - maps outcomes to operator-facing messages and keeps
//! the recent-activity log

use crate::domain::{Presentation, RecentScanEntry, ScanOutcome, Tone};
use chrono::{DateTime, Local, Utc};
use std::collections::VecDeque;

/// Maximum entries kept in the recent-activity log
pub const RECENT_SCANS_CAPACITY: usize = 20;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bounded newest-first log of successful scans
#[derive(Debug, Default)]
pub struct RecentScans {
    entries: VecDeque<RecentScanEntry>,
}

impl RecentScans {
    pub fn push(&mut self, entry: RecentScanEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(RECENT_SCANS_CAPACITY);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecentScanEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<RecentScanEntry> {
        self.entries.iter().cloned().collect()
    }
}

fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn presentation(tone: Tone, title: &str, body: String, detail: Option<String>) -> Presentation {
    Presentation {
        tone,
        icon: tone.icon(),
        color: tone.color(),
        title: title.to_string(),
        body,
        detail,
    }
}

#[derive(Debug, Default)]
pub struct ResultPresenter {
    recent: RecentScans,
}

impl ResultPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render an outcome; successes are also logged as recent scans
    pub fn present(&mut self, outcome: &ScanOutcome) -> Presentation {
        match outcome {
            ScanOutcome::Success { examinee, scanned_at, session } => {
                let time = local_time(scanned_at);
                self.recent.push(RecentScanEntry {
                    name: examinee.full_name.clone(),
                    time: time.clone(),
                    session: session.clone(),
                });
                presentation(
                    Tone::Success,
                    "Attendance Registered",
                    format!("{} registered at {}", examinee.full_name, time),
                    examinee.national_id.as_ref().map(|id| format!("ID: {id}")),
                )
            }
            ScanOutcome::DuplicateWarning { examinee, session } => {
                let body = match session {
                    Some(session) => format!(
                        "{} has already been marked as present for session \"{}\"",
                        examinee.full_name, session
                    ),
                    None => format!("{} has already been marked as present", examinee.full_name),
                };
                presentation(
                    Tone::Warning,
                    "Already Registered",
                    body,
                    examinee.national_id.as_ref().map(|id| format!("ID: {id}")),
                )
            }
            ScanOutcome::NotFound { .. } => presentation(
                Tone::Error,
                "Invalid Code",
                "This QR code does not match any examinee in your center.".to_string(),
                None,
            ),
            ScanOutcome::Error { message } => {
                let body = if message.trim().is_empty() {
                    "An unexpected error occurred.".to_string()
                } else {
                    message.clone()
                };
                presentation(Tone::Error, "Error", body, None)
            }
        }
    }

    pub fn recent(&self) -> &RecentScans {
        &self.recent
    }
}
