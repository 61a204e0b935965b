//! Per-target discovery of dynamically named printer objects.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::objects::{EntityGroup, MCU_QUERY_FIELDS, classify_name};

/// A discovered object: its full upstream name and its instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredObject {
    pub object: String,
    pub instance: String,
}

/// Dynamically named objects present on one printer, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomEntities {
    groups: BTreeMap<EntityGroup, Vec<DiscoveredObject>>,
}

impl CustomEntities {
    /// Keep the names that match a dynamic object rule, in listing order.
    pub fn from_object_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut groups: BTreeMap<EntityGroup, Vec<DiscoveredObject>> = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            if let Some(entity) = classify_name(name) {
                groups.entry(entity.group).or_default().push(DiscoveredObject {
                    object: name.to_string(),
                    instance: entity.instance,
                });
            }
        }
        Self { groups }
    }

    pub fn instances(&self, group: EntityGroup) -> &[DiscoveredObject] {
        self.groups.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Query parameters selecting every discovered object.
    ///
    /// Microcontrollers are restricted to their `last_stats` field; other
    /// objects are requested whole.
    pub fn query_params(&self) -> impl Iterator<Item = (String, Option<String>)> + '_ {
        self.groups.iter().flat_map(|(group, objects)| {
            objects.iter().map(move |discovered| {
                let fields = match group {
                    EntityGroup::Microcontroller => Some(MCU_QUERY_FIELDS.to_string()),
                    _ => None,
                };
                (discovered.object.clone(), fields)
            })
        })
    }

    /// Total number of discovered objects.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Discovery results keyed by target.
///
/// Entries are filled once and never refreshed. Concurrent first requests
/// for the same target share a single discovery call; a failed or
/// cancelled discovery leaves no entry behind, so the next request tries
/// again.
#[derive(Debug, Default)]
pub struct EntityCache {
    entries: Mutex<HashMap<String, Slot>>,
}

/// A target's discovery cell and the number of callers currently using it.
#[derive(Debug, Default)]
struct Slot {
    cell: Arc<OnceCell<Arc<CustomEntities>>>,
    holders: usize,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached entities for `target`, running `discover` if absent.
    pub async fn get_or_discover<F, Fut, E>(
        &self,
        target: &str,
        discover: F,
    ) -> Result<Arc<CustomEntities>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CustomEntities, E>>,
    {
        let cell = {
            let mut entries = self.entries.lock();
            let slot = entries.entry(target.to_string()).or_default();
            slot.holders += 1;
            slot.cell.clone()
        };
        let _hold = SlotHold {
            cache: self,
            target,
        };

        cell.get_or_try_init(|| async move { discover().await.map(Arc::new) })
            .await
            .cloned()
    }

    pub fn get(&self, target: &str) -> Option<Arc<CustomEntities>> {
        let entries = self.entries.lock();
        entries.get(target).and_then(|slot| slot.cell.get().cloned())
    }

    /// Number of targets with a completed discovery.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|slot| slot.cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release one hold on `target`, dropping the slot if it is the last
    /// hold and discovery never completed.
    fn release(&self, target: &str) {
        let mut entries = self.entries.lock();
        let abandoned = match entries.get_mut(target) {
            Some(slot) => {
                slot.holders = slot.holders.saturating_sub(1);
                slot.holders == 0 && !slot.cell.initialized()
            }
            None => false,
        };
        if abandoned {
            entries.remove(target);
        }
    }
}

/// Releases a caller's hold on failure, success or cancellation alike.
struct SlotHold<'a> {
    cache: &'a EntityCache,
    target: &'a str,
}

impl Drop for SlotHold<'_> {
    fn drop(&mut self) {
        self.cache.release(self.target);
    }
}
