//! Transient user-visible notices
//!
//! Failures that are swallowed at a service boundary (resource loads,
//! writes, notification dispatch) end here as one short message, in
//! addition to being logged. How notices are shown is up to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Default number of notices kept by a [`NoticeBoard`]
pub const DEFAULT_NOTICE_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

/// Destination for transient notices
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Bounded in-memory notice list; the oldest notice is dropped when full
#[derive(Debug)]
pub struct NoticeBoard {
    capacity: usize,
    notices: Mutex<VecDeque<Notice>>,
}

impl NoticeBoard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            notices: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|notices| notices.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<Notice> {
        self.notices
            .lock()
            .ok()
            .and_then(|notices| notices.back().cloned())
    }

    pub fn len(&self) -> usize {
        self.notices.lock().map(|n| n.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every notice (the user dismissed them)
    pub fn clear(&self) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.clear();
        }
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_NOTICE_CAPACITY)
    }
}

impl NoticeSink for NoticeBoard {
    fn notify(&self, notice: Notice) {
        match self.notices.lock() {
            Ok(mut notices) => {
                if notices.len() == self.capacity {
                    notices.pop_front();
                }
                notices.push_back(notice);
            }
            Err(_) => tracing::warn!("Notice board lock poisoned, dropping: {}", notice.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_is_bounded() {
        let board = NoticeBoard::new(2);
        board.notify(Notice::error("one"));
        board.notify(Notice::info("two"));
        board.notify(Notice::error("three"));

        let messages: Vec<String> = board.notices().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(board.latest().map(|n| n.level), Some(NoticeLevel::Error));
    }

    #[test]
    fn test_clear() {
        let board = NoticeBoard::default();
        board.notify(Notice::info("saved"));
        board.clear();
        assert!(board.is_empty());
    }
}
