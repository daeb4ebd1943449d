use serde::Serialize;
use time::{macros::format_description, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use super::publisher::FeedSnapshot;

pub const EMPTY_MESSAGE: &str = "Ready to scan tickets...";

/// One rendered check-in row.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub display_initial: String,
    pub name: String,
    pub roll: String,
    pub formatted_time: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenderedFeed {
    Empty {
        message: &'static str,
        stale: bool,
    },
    Entries {
        count: usize,
        entries: Vec<FeedEntry>,
        stale: bool,
    },
}

/// Client side of the live feed: renders snapshots and suppresses the ones
/// that would not change what is on screen.
#[derive(Debug)]
pub struct LiveFeedView {
    offset: UtcOffset,
    last: Option<(Vec<Uuid>, bool)>,
}

impl LiveFeedView {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset, last: None }
    }

    pub fn render(&self, snapshot: &FeedSnapshot) -> RenderedFeed {
        if snapshot.records.is_empty() {
            return RenderedFeed::Empty {
                message: EMPTY_MESSAGE,
                stale: snapshot.stale,
            };
        }
        let entries: Vec<FeedEntry> = snapshot
            .records
            .iter()
            .map(|a| FeedEntry {
                display_initial: display_initial(&a.student_name),
                name: a.student_name.clone(),
                roll: a.student_roll.clone(),
                formatted_time: format_time(a.timestamp, self.offset),
            })
            .collect();
        RenderedFeed::Entries {
            count: entries.len(),
            entries,
            stale: snapshot.stale,
        }
    }

    /// Renders `snapshot` unless it shows the same rows and staleness as the
    /// last rendered one.
    pub fn apply(&mut self, snapshot: &FeedSnapshot) -> Option<RenderedFeed> {
        let key = (
            snapshot.records.iter().map(|a| a.id).collect::<Vec<_>>(),
            snapshot.stale,
        );
        if self.last.as_ref() == Some(&key) {
            return None;
        }
        self.last = Some(key);
        Some(self.render(snapshot))
    }
}

fn display_initial(name: &str) -> String {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

/// `HH:MM` in the display offset.
pub fn format_time(ts: OffsetDateTime, offset: UtcOffset) -> String {
    ts.to_offset(offset)
        .format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| "--:--".to_string())
}
