//! Packet history tracking for debugging and diagnostics.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::light::TransportKind;

/// Outcome of a recorded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketOutcome {
    Sent,
    Failed,
    Received,
}

/// A recorded packet in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub outcome: PacketOutcome,
    pub transport: TransportKind,
    pub target: String,
    pub packet: String,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Bounded log of dispatched and received packets.
#[derive(Debug, Clone)]
pub struct PacketHistory {
    sent: usize,
    failed: usize,
    received: usize,
    last_error: Option<String>,
    start_time: Instant,
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
}

impl Default for PacketHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self {
            sent: 0,
            failed: 0,
            received: 0,
            last_error: None,
            start_time: Instant::now(),
            entries: VecDeque::new(),
            max_entries: Self::DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::new()
        }
    }

    pub fn record(&mut self, outcome: PacketOutcome, transport: TransportKind, target: &str, packet: String) {
        match outcome {
            PacketOutcome::Sent => self.sent += 1,
            PacketOutcome::Failed => self.failed += 1,
            PacketOutcome::Received => self.received += 1,
        }

        self.entries.push_back(HistoryEntry {
            outcome,
            transport,
            target: target.to_string(),
            packet,
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });

        if self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.sent = 0;
        self.failed = 0;
        self.received = 0;
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            sent_count: self.sent,
            failed_count: self.failed,
            received_count: self.received,
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of packet history for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub sent_count: usize,
    pub failed_count: usize,
    pub received_count: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_outcomes() {
        let mut history = PacketHistory::new();
        history.record(PacketOutcome::Sent, TransportKind::Udp, "Udp:10.0.0.2", "0,1,1&".into());
        history.record(PacketOutcome::Failed, TransportKind::Udp, "Udp:10.0.0.2", "0,1,1&".into());

        let summary = history.summary();
        assert_eq!(summary.sent_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.total_entries, 2);
    }

    #[test]
    fn test_record_error() {
        let mut history = PacketHistory::new();
        history.record_error("no backend registered for Serial");
        assert_eq!(history.last_error(), Some("no backend registered for Serial"));
    }

    #[test]
    fn test_max_entries() {
        let mut history = PacketHistory::with_max_entries(2);
        for i in 0..5 {
            history.record(PacketOutcome::Sent, TransportKind::Hue, "bridge", format!("{i}"));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries().next().unwrap().packet, "3");
        assert_eq!(history.summary().sent_count, 5);
    }
}
