//! Accumulation window of the delivery stage.

use std::time::Duration;

use guild_indexer_repository::Cursor;
use guild_indexer_shared::{Guild, GuildDocument, SequencePosition};
use tokio::time::Instant;

/// Lifecycle of a window.
///
/// `Accumulating -> Flushing -> Delivered`, or through `Retrying` to `Delivered` or
/// `DeadLettered`. The last two are terminal: the window is discarded and its cursor may be
/// committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Accumulating,
    Flushing,
    Retrying { attempt: u32 },
    Delivered,
    DeadLettered,
}

impl WindowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::DeadLettered)
    }
}

/// A document waiting for delivery, with the guild it was built from.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    /// The guild as captured, before enrichment. This is what gets dead-lettered.
    pub original: Guild,
    pub document: GuildDocument,
    pub position: SequencePosition,
}

/// Documents accumulated since the last flush, plus the cursor covering them.
///
/// This is the `Accumulating` window. [`Window::take`] hands its content to a flush, which
/// tracks the rest of the lifecycle on its own.
#[derive(Debug, Default)]
pub struct Window {
    entries: Vec<WindowEntry>,
    cursor: Cursor,
    opened_at: Option<Instant>,
}

impl Window {
    pub fn push(&mut self, entry: WindowEntry) {
        if self.opened_at.is_none() {
            self.opened_at = Some(Instant::now());
        }
        self.cursor.advance(entry.position);
        self.entries.push(entry);
    }

    /// Extend the window's cursor, e.g. with records the filter dropped.
    pub fn absorb(&mut self, cursor: &Cursor) {
        self.cursor.merge(cursor);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When the window reaches its maximum age. `None` while empty.
    pub fn deadline(&self, max_age: Duration) -> Option<Instant> {
        self.opened_at.map(|opened| opened + max_age)
    }

    /// Whether the window must be flushed now.
    pub fn is_due(&self, max_documents: usize, max_age: Duration, now: Instant) -> bool {
        self.len() >= max_documents
            || self.deadline(max_age).is_some_and(|deadline| now >= deadline)
    }

    /// Empty the window, returning its entries and cursor.
    pub fn take(&mut self) -> (Vec<WindowEntry>, Cursor) {
        let taken = std::mem::take(self);
        (taken.entries, taken.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, offset: i64) -> WindowEntry {
        let guild = Guild::new(id, vec![]);
        WindowEntry {
            document: GuildDocument::from_guild(&guild, vec![]),
            original: guild,
            position: SequencePosition::new(0, offset),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_is_due_by_size_or_age() {
        let max_age = Duration::from_secs(60);
        let mut window = Window::default();
        assert!(window.deadline(max_age).is_none());
        assert!(!window.is_due(2, max_age, Instant::now()));

        window.push(entry("guild1", 0));
        assert!(!window.is_due(2, max_age, Instant::now()));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(window.is_due(2, max_age, Instant::now()));

        window.push(entry("guild2", 1));
        assert!(window.is_due(2, Duration::from_secs(3600), Instant::now()));
    }

    #[tokio::test]
    async fn test_take_resets_window() {
        let mut window = Window::default();
        window.push(entry("guild1", 4));
        let mut dropped = Cursor::default();
        dropped.advance(SequencePosition::new(1, 9));
        window.absorb(&dropped);

        let (entries, cursor) = window.take();

        assert_eq!(entries.len(), 1);
        assert_eq!(cursor.next_offset(0), 5);
        assert_eq!(cursor.next_offset(1), 10);
        assert!(window.is_empty());
        assert!(window.deadline(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(WindowState::Delivered.is_terminal());
        assert!(WindowState::DeadLettered.is_terminal());
        assert!(!WindowState::Retrying { attempt: 1 }.is_terminal());
    }
}
