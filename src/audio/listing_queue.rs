use std::collections::VecDeque;
use tracing::debug;

use super::{
    events::{EventHub, SessionEvent},
    playable::SongListing,
};

/// Cola acotada de doble extremo, usada igual para historial y pendientes.
///
/// The "old" end is the front: for the pending queue that is the next item to
/// play, for the history it is the most distant past. When full, a queue with
/// `discard_on_full` evicts from the opposite end before inserting; otherwise
/// the insert is refused and the listing handed back in the `Err`.
#[derive(Debug)]
pub struct ListingQueue {
    items: VecDeque<SongListing>,
    capacity: usize,
    discard_on_full: bool,
    events: EventHub,
}

impl ListingQueue {
    pub fn new(capacity: usize, discard_on_full: bool, events: EventHub) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            discard_on_full,
            events,
        }
    }

    pub fn add_old_end(&mut self, item: SongListing) -> Result<(), SongListing> {
        if self.is_full() {
            if !self.discard_on_full || self.capacity == 0 {
                return Err(item);
            }
            if let Some(evicted) = self.items.pop_back() {
                debug!("🗑️ Descartado por cola llena: {}", evicted.title());
            }
        }
        self.items.push_front(item);
        self.changed();
        Ok(())
    }

    pub fn add_new_end(&mut self, item: SongListing) -> Result<(), SongListing> {
        if self.is_full() {
            if !self.discard_on_full || self.capacity == 0 {
                return Err(item);
            }
            if let Some(evicted) = self.items.pop_front() {
                debug!("🗑️ Descartado por cola llena: {}", evicted.title());
            }
        }
        self.items.push_back(item);
        self.changed();
        Ok(())
    }

    pub fn remove_oldest(&mut self) -> Option<SongListing> {
        let item = self.items.pop_front();
        if item.is_some() {
            self.changed();
        }
        item
    }

    pub fn remove_newest(&mut self) -> Option<SongListing> {
        let item = self.items.pop_back();
        if item.is_some() {
            self.changed();
        }
        item
    }

    pub fn remove_at(&mut self, index: usize) -> Option<SongListing> {
        let item = self.items.remove(index);
        if item.is_some() {
            self.changed();
        }
        item
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            self.items.clear();
            self.changed();
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Option<&SongListing> {
        self.items.get(index)
    }

    pub fn newest(&self) -> Option<&SongListing> {
        self.items.back()
    }

    /// Itera del extremo viejo al nuevo
    pub fn iter(&self) -> impl Iterator<Item = &SongListing> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<SongListing> {
        self.items.iter().cloned().collect()
    }

    fn changed(&self) {
        self.events.emit(SessionEvent::QueueUpdate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playable::{Playable, Song};
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn listing(title: &str) -> SongListing {
        SongListing::new(
            Playable::Song(Song::new(title, format!("https://example.com/{title}"))),
            UserId::new(7),
        )
    }

    fn titles(queue: &ListingQueue) -> Vec<String> {
        queue.iter().map(|l| l.title().to_string()).collect()
    }

    #[test]
    fn test_discarding_queue_never_exceeds_capacity() {
        let mut history = ListingQueue::new(3, true, EventHub::default());
        for i in 0..10 {
            history.add_new_end(listing(&format!("s{i}"))).unwrap();
            assert!(history.len() <= 3);
        }
        assert_eq!(titles(&history), vec!["s7", "s8", "s9"]);
    }

    #[test]
    fn test_add_old_end_evicts_newest_when_discarding() {
        let mut history = ListingQueue::new(2, true, EventHub::default());
        history.add_new_end(listing("a")).unwrap();
        history.add_new_end(listing("b")).unwrap();
        history.add_old_end(listing("z")).unwrap();
        assert_eq!(titles(&history), vec!["z", "a"]);
    }

    #[test]
    fn test_refusing_queue_keeps_original_items() {
        let mut queue = ListingQueue::new(2, false, EventHub::default());
        queue.add_new_end(listing("a")).unwrap();
        queue.add_new_end(listing("b")).unwrap();

        let rejected = queue.add_new_end(listing("c")).unwrap_err();
        assert_eq!(rejected.title(), "c");
        assert!(queue.add_old_end(listing("d")).is_err());
        assert!(queue.is_full());
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_at_and_ends() {
        let mut queue = ListingQueue::new(5, false, EventHub::default());
        for title in ["a", "b", "c", "d"] {
            queue.add_new_end(listing(title)).unwrap();
        }
        assert_eq!(queue.remove_at(1).map(|l| l.title().to_string()), Some("b".into()));
        assert!(queue.remove_at(10).is_none());
        assert_eq!(queue.remove_oldest().map(|l| l.title().to_string()), Some("a".into()));
        assert_eq!(queue.remove_newest().map(|l| l.title().to_string()), Some("d".into()));
        assert_eq!(titles(&queue), vec!["c"]);
    }

    #[test]
    fn test_mutations_publish_queue_update() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe();
        let mut queue = ListingQueue::new(1, false, hub);

        queue.add_new_end(listing("a")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::QueueUpdate);

        // Un insert rechazado no cambia nada
        let _ = queue.add_new_end(listing("b"));
        assert!(rx.try_recv().is_err());

        queue.remove_oldest();
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::QueueUpdate);
    }
}
