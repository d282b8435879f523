//! User-facing error notifications
//!
//! The loop raises a notification the first time a given error shows up.
//! Which one depends on whether the rule file is at fault: broken rules point
//! the user at the rule editor, anything else at the log file.

use crate::constants::{APP_NAME, LOG_FILE_NAME};
use log::error;
use std::fmt;

/// Follow-up offered with a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    OpenRuleEditor,
    OpenLogFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Loading or applying rules failed because the rule file is invalid
    RulesInvalid { message: String },
    /// Anything else; `fatal` when the governor is about to stop
    EngineFailure { message: String, fatal: bool },
}

impl Notification {
    pub fn action(&self) -> NotificationAction {
        match self {
            Notification::RulesInvalid { .. } => NotificationAction::OpenRuleEditor,
            Notification::EngineFailure { .. } => NotificationAction::OpenLogFile,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::RulesInvalid { message } => write!(
                f,
                "An error has occurred while loading or applying the rules: {}. \
                 Please check the correctness of the rules.",
                message
            ),
            Notification::EngineFailure { message, fatal } => {
                write!(f, "An error has occurred in the {} application", APP_NAME)?;
                if *fatal {
                    write!(f, " and it will now close")?;
                }
                write!(
                    f,
                    ": {}. To troubleshoot, please check the log file `{}` for details.",
                    message, LOG_FILE_NAME
                )
            }
        }
    }
}

/// Receives notifications for the user
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        error!("{}", notification);
    }
}
