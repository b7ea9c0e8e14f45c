//! Terminal rendering of the live reader state.
//!
//! [`TagView`] folds [`ReaderEvent`]s into two panels: tags first recorded
//! during this session, and every known tag ordered by last sighting.

use std::collections::VecDeque;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::monitor::ReaderEvent;
use crate::tag::{display_time, TagRead, TagRecord};

const TITLE: &str = "RFID Tag Reader";
const COLUMNS: [&str; 4] = ["Tag ID", "First Seen", "Last Seen", "Signal"];

/// One row in a panel.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRow {
    /// Tag identifier as lowercase hex.
    pub tag_id: String,
    /// First sighting.
    pub first_seen: DateTime<Utc>,
    /// Latest sighting.
    pub last_seen: DateTime<Utc>,
    /// Signal strength of the latest sighting, 0-100.
    pub rssi_percent: f64,
}

impl TagRow {
    fn refresh(&mut self, read: &TagRead) {
        self.last_seen = read.timestamp;
        self.rssi_percent = read.rssi_percent;
    }

    fn cells(&self) -> [String; 4] {
        [
            self.tag_id.clone(),
            display_time(self.first_seen),
            display_time(self.last_seen),
            format!("{:.1}%", self.rssi_percent),
        ]
    }
}

impl From<&TagRead> for TagRow {
    fn from(read: &TagRead) -> Self {
        Self {
            tag_id: read.tag_id.clone(),
            first_seen: read.timestamp,
            last_seen: read.timestamp,
            rssi_percent: read.rssi_percent,
        }
    }
}

impl From<&TagRecord> for TagRow {
    fn from(record: &TagRecord) -> Self {
        Self {
            tag_id: record.tag_id.clone(),
            first_seen: record.first_seen,
            last_seen: record.last_seen,
            rssi_percent: record.rssi_percent,
        }
    }
}

/// Live display state.
#[derive(Debug, Clone)]
pub struct TagView {
    status: String,
    total: i64,
    latest: Option<TagRead>,
    session: VecDeque<TagRow>,
    history: VecDeque<TagRow>,
    max_rows: usize,
}

impl TagView {
    /// An empty view keeping at most `max_rows` rows per panel.
    #[must_use]
    pub fn new(max_rows: usize) -> Self {
        Self {
            status: "Waiting for tags...".to_string(),
            total: 0,
            latest: None,
            session: VecDeque::new(),
            history: VecDeque::new(),
            max_rows: max_rows.max(1),
        }
    }

    /// Replace the history panel with stored records, newest first.
    pub fn load_history<'a>(&mut self, records: impl IntoIterator<Item = &'a TagRecord>) {
        self.history = records.into_iter().map(TagRow::from).collect();
        self.total = i64::try_from(self.history.len()).unwrap_or(i64::MAX);
        self.history.truncate(self.max_rows);
    }

    /// Fold one event into the view. Returns whether anything changed.
    pub fn apply(&mut self, event: ReaderEvent) -> bool {
        match event {
            ReaderEvent::Status(status) => {
                if status == self.status {
                    return false;
                }
                self.status = status;
            }
            ReaderEvent::Count(total) => {
                if total == self.total {
                    return false;
                }
                self.total = total;
            }
            ReaderEvent::NewTag(read) => {
                let row = TagRow::from(&read);
                self.session.retain(|r| r.tag_id != row.tag_id);
                self.session.push_front(row.clone());
                self.session.truncate(self.max_rows);
                self.history.retain(|r| r.tag_id != row.tag_id);
                self.history.push_front(row);
                self.history.truncate(self.max_rows);
                self.latest = Some(read);
            }
            ReaderEvent::Seen(read) => {
                if let Some(row) = self.session.iter_mut().find(|r| r.tag_id == read.tag_id) {
                    row.refresh(&read);
                }
                let mut row = self
                    .history
                    .iter()
                    .position(|r| r.tag_id == read.tag_id)
                    .and_then(|index| self.history.remove(index))
                    .unwrap_or_else(|| TagRow::from(&read));
                row.refresh(&read);
                self.history.push_front(row);
                self.history.truncate(self.max_rows);
                self.latest = Some(read);
            }
        }
        true
    }

    /// Render the whole view as text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{TITLE}");
        let _ = writeln!(out, "{}", "=".repeat(TITLE.len()));
        let _ = writeln!(out, "{}    Total Tags: {}", self.status, self.total);
        out.push('\n');

        let _ = writeln!(out, "Latest Read");
        match &self.latest {
            Some(read) => {
                let _ = writeln!(
                    out,
                    "Tag: {}  |  Time: {}  |  Signal: {}",
                    read.tag_id,
                    read.display_time(),
                    read.signal_label()
                );
            }
            None => {
                let _ = writeln!(out, "No tags read yet");
            }
        }
        out.push('\n');

        render_panel(&mut out, "New Tags", &self.session);
        out.push('\n');
        render_panel(&mut out, "Existing Tags", &self.history);
        out
    }
}

fn render_panel(out: &mut String, title: &str, rows: &VecDeque<TagRow>) {
    let _ = writeln!(out, "{title} ({})", rows.len());

    let cells: Vec<[String; 4]> = rows.iter().map(TagRow::cells).collect();
    let mut widths = COLUMNS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let _ = writeln!(out, "{}", format_line(&COLUMNS.map(String::from), &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));
    for row in &cells {
        let _ = writeln!(out, "{}", format_line(row, &widths));
    }
}

fn format_line(cells: &[String; 4], widths: &[usize; 4]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
