use async_trait::async_trait;

use crate::category::EventCategory;

/// A component able to populate event categories from an upstream source.
///
/// The orchestrator asks each producer, in priority order, whether it will
/// serve a category. `produce_events` is called at most once per category
/// and is side-effecting: a producer returning `true` has attached whatever
/// handlers or subscriptions it needs and now owns that category.
///
/// Implementations must not return errors: any failure while attaching is
/// logged by the producer and reported as `false`.
#[async_trait]
pub trait Producer: Send + Sync {
    /// A short, stable name used in logs.
    fn name(&self) -> &'static str;

    /// Attaches to the upstream source for `category` and reports ownership.
    async fn produce_events(&self, category: EventCategory) -> bool;
}
