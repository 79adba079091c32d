use tracing::{debug, error};

use super::{
    events::EventHub,
    listing_queue::ListingQueue,
    playable::SongListing,
};

/// Historial + cola pendiente + el slot "actual".
///
/// Every transition between the three is one of the named methods below;
/// skip, unskip and loop handling are built only from these.
#[derive(Debug)]
pub struct ListingManager {
    history: ListingQueue,
    queue: ListingQueue,
    current: Option<SongListing>,
    events: EventHub,
}

impl ListingManager {
    pub fn new(queue_capacity: usize, history_capacity: usize, events: EventHub) -> Self {
        Self {
            history: ListingQueue::new(history_capacity, true, events.clone()),
            queue: ListingQueue::new(queue_capacity, false, events.clone()),
            current: None,
            events,
        }
    }

    pub fn current(&self) -> Option<&SongListing> {
        self.current.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut SongListing> {
        self.current.as_mut()
    }

    pub fn queue(&self) -> &ListingQueue {
        &self.queue
    }

    pub fn history(&self) -> &ListingQueue {
        &self.history
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Encola una solicitud nueva. Devuelve el listing si la cola está llena.
    pub fn enqueue(&mut self, listing: SongListing) -> Result<(), SongListing> {
        self.queue.add_new_end(listing)
    }

    /// Manda el actual al historial. Una colección retrocede su cursor un paso,
    /// que se compensa con el incremento cuando vuelva a ser la actual.
    pub fn move_current_to_history(&mut self) -> bool {
        let Some(mut listing) = self.current.take() else {
            error!("move_current_to_history sin listing actual");
            return false;
        };
        if let Some(collection) = listing.playable.as_collection_mut() {
            collection.step_back();
        }
        debug!("📜 Al historial: {}", listing.title());
        // El historial descarta su entrada más vieja, nunca rechaza
        let _ = self.history.add_new_end(listing);
        true
    }

    /// Devuelve el actual al frente de la cola, será lo próximo en sonar
    pub fn move_current_to_queue(&mut self) -> bool {
        let Some(listing) = self.current.take() else {
            error!("move_current_to_queue sin listing actual");
            return false;
        };
        match self.queue.add_old_end(listing) {
            Ok(()) => true,
            Err(listing) => {
                // Cola llena: el actual no se pierde
                self.current = Some(listing);
                false
            }
        }
    }

    pub fn take_current_from_queue(&mut self) -> bool {
        if self.current.is_some() {
            error!("take_current_from_queue con un listing actual");
            return false;
        }
        match self.queue.remove_oldest() {
            Some(listing) => {
                debug!("➡️ Siguiente en cola: {}", listing.title());
                self.current = Some(listing);
                true
            }
            None => false,
        }
    }

    /// Mueve los `count` pendientes más próximos al historial, en orden
    pub fn move_from_queue_to_history(&mut self, count: usize) -> usize {
        let mut moved = 0;
        while moved < count {
            let Some(listing) = self.queue.remove_oldest() else {
                break;
            };
            let _ = self.history.add_new_end(listing);
            moved += 1;
        }
        moved
    }

    /// Devuelve las `count` entradas más recientes del historial al frente de
    /// la cola; la más reciente queda detrás de las otras.
    pub fn move_from_history_to_queue(&mut self, count: usize) -> usize {
        let mut moved = 0;
        while moved < count && !self.queue.is_full() {
            let Some(listing) = self.history.remove_newest() else {
                break;
            };
            if let Err(listing) = self.queue.add_old_end(listing) {
                let _ = self.history.add_new_end(listing);
                break;
            }
            moved += 1;
        }
        moved
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.queue.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playable::{Playable, Song, SongCollection};
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn song(title: &str) -> SongListing {
        SongListing::new(
            Playable::Song(Song::new(title, format!("https://example.com/{title}"))),
            UserId::new(1),
        )
    }

    fn manager(items: &[&str]) -> ListingManager {
        let mut manager = ListingManager::new(10, 10, EventHub::default());
        for item in items {
            manager.enqueue(song(item)).unwrap();
        }
        manager
    }

    fn state(manager: &ListingManager) -> (Vec<String>, Option<String>, Vec<String>) {
        (
            manager.history().iter().map(|l| l.title().to_string()).collect(),
            manager.current().map(|l| l.title().to_string()),
            manager.queue().iter().map(|l| l.title().to_string()).collect(),
        )
    }

    #[test]
    fn test_history_then_take_is_one_advance() {
        let mut manager = manager(&["a", "b", "c"]);
        assert!(manager.take_current_from_queue());

        assert!(manager.move_current_to_history());
        assert!(manager.take_current_from_queue());

        assert_eq!(
            state(&manager),
            (vec!["a".into()], Some("b".into()), vec!["c".into()])
        );
    }

    #[test]
    fn test_move_current_to_queue_puts_it_next() {
        let mut manager = manager(&["a", "b"]);
        manager.take_current_from_queue();
        assert!(manager.move_current_to_queue());
        assert_eq!(state(&manager), (vec![], None, vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_take_requires_empty_current() {
        let mut manager = manager(&["a", "b"]);
        manager.take_current_from_queue();
        assert!(!manager.take_current_from_queue());
        assert_eq!(manager.queue().len(), 1);
    }

    #[test]
    fn test_bulk_moves_preserve_order() {
        let mut manager = manager(&["a", "b", "c", "d"]);
        assert_eq!(manager.move_from_queue_to_history(3), 3);
        assert_eq!(
            state(&manager),
            (vec!["a".into(), "b".into(), "c".into()], None, vec!["d".into()])
        );

        assert_eq!(manager.move_from_history_to_queue(2), 2);
        assert_eq!(
            state(&manager),
            (vec!["a".into()], None, vec!["b".into(), "c".into(), "d".into()])
        );
    }

    #[test]
    fn test_bulk_moves_stop_when_source_is_exhausted() {
        let mut manager = manager(&["a"]);
        assert_eq!(manager.move_from_queue_to_history(5), 1);
        assert_eq!(manager.move_from_history_to_queue(5), 1);
    }

    #[test]
    fn test_collection_position_steps_back_on_retire() {
        let mut manager = ListingManager::new(10, 10, EventHub::default());
        let mut collection = SongCollection::new(
            "list",
            "https://example.com/list",
            vec![Song::new("a", "https://example.com/a"), Song::new("b", "https://example.com/b")],
        );
        collection.set_position(1);
        manager
            .enqueue(SongListing::new(Playable::Collection(collection), UserId::new(1)))
            .unwrap();
        manager.take_current_from_queue();
        manager.move_current_to_history();

        let retired = manager.history().newest().and_then(|l| l.playable.as_collection());
        assert_eq!(retired.map(|c| c.position()), Some(0));
    }
}
