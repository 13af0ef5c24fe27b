/*!
Suppression of repeated deliveries across polling cycles
*/

use std::cmp::Ordering;

use tracing::debug;

use crate::core::event::DeletionEvent;

/// Remembers the id of the last admitted event.
///
/// This is a single slot, not a set. Record ids are monotonic per source, so
/// an id that orders at or before the slot has already been delivered and is
/// suppressed; this is what keeps a re-read log window quiet. Ids that do not
/// follow the `<secs>.<millis>:<serial>[#<item>]` shape can only be compared
/// for equality. A restart can still produce a duplicate.
#[derive(Debug, Default)]
pub struct Deduplicator {
    last_event_id: Option<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the event if it should be delivered, `None` if it repeats the
    /// last admitted id or orders before it. Feed events oldest first.
    /// Events without an id cannot be compared and are always admitted
    /// without touching the slot.
    pub fn admit(&mut self, event: DeletionEvent) -> Option<DeletionEvent> {
        let Some(id) = event.event_id.as_deref() else {
            return Some(event);
        };

        if let Some(last) = self.last_event_id.as_deref() {
            let seen = match (RecordOrder::parse(id), RecordOrder::parse(last)) {
                (Some(id), Some(last)) => id.cmp(&last) != Ordering::Greater,
                _ => id == last,
            };
            if seen {
                debug!("Suppressing already delivered event {}", id);
                return None;
            }
        }

        self.last_event_id = Some(id.to_string());
        Some(event)
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }
}

/// Sort key of a record id: time, serial, then item
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RecordOrder {
    secs: u64,
    millis: u32,
    serial: u64,
    item: u32,
}

impl RecordOrder {
    fn parse(id: &str) -> Option<Self> {
        let (record, item) = match id.split_once('#') {
            Some((record, item)) => (record, item.parse().ok()?),
            None => (id, 0),
        };
        let (time, serial) = record.split_once(':')?;
        let (secs, millis) = time.split_once('.').unwrap_or((time, "0"));
        Some(Self {
            secs: secs.parse().ok()?,
            millis: millis.parse().ok()?,
            serial: serial.parse().ok()?,
            item,
        })
    }
}
