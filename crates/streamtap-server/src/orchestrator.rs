//! Assigns every event category to the first producer willing to serve it.

use std::collections::BTreeMap;
use std::sync::Arc;

use streamtap_observe::Emitter;
use streamtap_types::{EventCategory, Producer};
use tokio::sync::Mutex;

/// Walks producers in priority order and records which one owns each
/// category.
///
/// Ownership persists across passes: a later
/// [`subscribe_producers`](Self::subscribe_producers) call only offers the
/// categories still unowned.
pub struct ProducersOrchestrator {
    producers: Vec<Arc<dyn Producer>>,
    emitter: Emitter,
    owners: Mutex<BTreeMap<EventCategory, &'static str>>,
}

impl ProducersOrchestrator {
    /// `producers` is in priority order: earlier producers win.
    pub fn new(producers: Vec<Arc<dyn Producer>>, emitter: Emitter) -> Self {
        Self {
            producers,
            emitter,
            owners: Mutex::new(BTreeMap::new()),
        }
    }

    /// Offers each unowned category to each producer, first to last.
    ///
    /// A producer is asked about a category at most once per pass and never
    /// about a category an earlier producer took. Returns the owner of every
    /// category served so far.
    pub async fn subscribe_producers(&self) -> BTreeMap<EventCategory, &'static str> {
        let mut owners = self.owners.lock().await;

        for producer in &self.producers {
            let unowned: Vec<EventCategory> = EventCategory::catalog()
                .filter(|category| !owners.contains_key(category))
                .collect();

            for category in unowned {
                if producer.produce_events(category).await {
                    owners.insert(category, producer.name());
                    self.emitter.info(format!(
                        "Ready to produce events {category} thanks to {}",
                        producer.name()
                    ));
                }
            }
        }

        let unserved = EventCategory::catalog()
            .filter(|category| !owners.contains_key(category))
            .count();
        if unserved > 0 {
            tracing::debug!(unserved, "some categories have no producer");
        }
        owners.clone()
    }

    /// The producer serving `category`, if any.
    pub async fn owner(&self, category: EventCategory) -> Option<&'static str> {
        self.owners.lock().await.get(&category).copied()
    }
}
