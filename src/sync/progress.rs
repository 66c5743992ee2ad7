//! Utilities to track the progression of a sync

use std::fmt::{Display, Error, Formatter};

use super::{SyncReport, SyncWarning};

/// An event that happens during a sync
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// Sync has not started
    NotStarted,
    /// Sync has just started but the server has not been contacted yet
    Started,
    /// Sync is in progress.
    InProgress{ details: String },
    /// Sync is finished
    Finished{ success: bool },
}

impl Display for SyncEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            SyncEvent::NotStarted => write!(f, "Not started"),
            SyncEvent::Started => write!(f, "Sync has started..."),
            SyncEvent::InProgress{details} => write!(f, "{}...", details),
            SyncEvent::Finished{success} => match success {
                true => write!(f, "Sync successfully finished"),
                false => write!(f, "Sync finished with errors"),
            }
        }
    }
}

impl Default for SyncEvent {
    fn default() -> Self {
        Self::NotStarted
    }
}


/// See [`feedback_channel`]
pub type FeedbackSender = tokio::sync::watch::Sender<SyncEvent>;
/// See [`feedback_channel`]
pub type FeedbackReceiver = tokio::sync::watch::Receiver<SyncEvent>;

/// Create a feeback channel, that can be used to retrieve the current progress of a sync operation
pub fn feedback_channel() -> (FeedbackSender, FeedbackReceiver) {
    tokio::sync::watch::channel(SyncEvent::default())
}


/// A structure that tracks the progression and the warnings of a sync
#[derive(Debug, Default)]
pub struct SyncProgress {
    report: SyncReport,
    feedback_channel: Option<FeedbackSender>
}
impl SyncProgress {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn new_with_feedback_channel(channel: FeedbackSender) -> Self {
        Self { report: SyncReport::default(), feedback_channel: Some(channel) }
    }

    /// Record a warning about a task. It is logged as well
    pub fn warn(&mut self, task_id: &str, message: String) {
        log::warn!("[{}] {}", task_id, message);
        self.report.warnings.push(SyncWarning { task_id: task_id.to_string(), message });
    }

    pub fn report_mut(&mut self) -> &mut SyncReport {
        &mut self.report
    }

    /// Send an event as a feedback to the listener (if any).
    pub fn feedback(&self, event: SyncEvent) {
        if let Some(sender) = &self.feedback_channel {
            // Nobody listening is fine
            let _ = sender.send(event);
        }
    }

    pub fn into_report(self) -> SyncReport {
        self.report
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_is_published() {
        let (sender, receiver) = feedback_channel();
        assert_eq!(*receiver.borrow(), SyncEvent::NotStarted);

        let mut progress = SyncProgress::new_with_feedback_channel(sender);
        progress.feedback(SyncEvent::Started);
        assert_eq!(*receiver.borrow(), SyncEvent::Started);

        progress.warn("abc", "could not upload".to_string());
        let report = progress.into_report();
        assert_eq!(report.warnings, vec![SyncWarning { task_id: "abc".to_string(), message: "could not upload".to_string() }]);
    }
}
