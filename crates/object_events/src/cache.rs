//! Version-stamped visible views over the entity tables.
//!
//! Every mutable borrow of [`Tracked`] advances the version, so a mutator
//! cannot change the tables without invalidating the cached views. Views are
//! rebuilt lazily, at most once per version, and keep their `Rc` identity
//! while the version is unchanged.
//!
//! Views hold ids only. Fields that never affect membership (runtime tile,
//! facing, sub-tile offset, walking) may be written through
//! [`Tracked::get_mut_unversioned`] without a rebuild.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::rc::Rc;

use crate::ids::{MapId, ObjectId};
use crate::records::{BgEvent, ItemBall, LargeObject, NpcObject, ObjectRecord, ScriptObject};

#[derive(Debug, Default)]
pub(crate) struct Tracked<T> {
    value: T,
    version: u64,
}

impl<T> Tracked<T> {
    #[cfg(test)]
    pub(crate) fn new(value: T) -> Self {
        Self { value, version: 0 }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.version += 1;
        &mut self.value
    }

    /// Mutable access that keeps the current version. Only for writes that
    /// cannot change which records a view contains.
    pub(crate) fn get_mut_unversioned(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Ids that left the view window. Records stay in their tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffscreenSets {
    pub npcs: BTreeSet<ObjectId>,
    pub items: BTreeSet<ObjectId>,
    pub script_objects: BTreeSet<ObjectId>,
    pub large_objects: BTreeSet<ObjectId>,
}

impl OffscreenSets {
    pub fn total(&self) -> usize {
        self.npcs.len() + self.items.len() + self.script_objects.len() + self.large_objects.len()
    }

    fn forget(&mut self, id: &ObjectId) {
        self.npcs.remove(id);
        self.items.remove(id);
        self.script_objects.remove(id);
        self.large_objects.remove(id);
    }
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub(crate) npcs: BTreeMap<ObjectId, NpcObject>,
    pub(crate) items: BTreeMap<ObjectId, ItemBall>,
    pub(crate) script_objects: BTreeMap<ObjectId, ScriptObject>,
    pub(crate) large_objects: BTreeMap<ObjectId, LargeObject>,
    pub(crate) bg_events: BTreeMap<ObjectId, BgEvent>,
    pub(crate) offscreen: OffscreenSets,
}

impl Tables {
    pub(crate) fn npc_present(&self, npc: &NpcObject) -> bool {
        npc.shown() && !self.offscreen.npcs.contains(&npc.id)
    }

    pub(crate) fn item_present(&self, item: &ItemBall) -> bool {
        item.shown() && !self.offscreen.items.contains(&item.id)
    }

    pub(crate) fn script_object_present(&self, object: &ScriptObject) -> bool {
        object.shown() && !self.offscreen.script_objects.contains(&object.id)
    }

    pub(crate) fn large_object_present(&self, object: &LargeObject) -> bool {
        object.shown() && !self.offscreen.large_objects.contains(&object.id)
    }

    pub(crate) fn retain_other_maps(&mut self, map_id: &MapId) -> usize {
        let mut removed = Vec::new();
        drain_map(&mut self.npcs, map_id, &mut removed);
        drain_map(&mut self.items, map_id, &mut removed);
        drain_map(&mut self.script_objects, map_id, &mut removed);
        drain_map(&mut self.large_objects, map_id, &mut removed);
        drain_map(&mut self.bg_events, map_id, &mut removed);
        for id in &removed {
            self.offscreen.forget(id);
        }
        removed.len()
    }
}

fn drain_map<T: ObjectRecord>(
    table: &mut BTreeMap<ObjectId, T>,
    map_id: &MapId,
    removed: &mut Vec<ObjectId>,
) {
    table.retain(|id, record| {
        if record.map_id() == map_id {
            removed.push(id.clone());
            false
        } else {
            true
        }
    });
}

struct VersionedView<T> {
    version: Cell<Option<u64>>,
    value: RefCell<Rc<T>>,
}

impl<T> VersionedView<T> {
    fn new(empty: T) -> Self {
        Self {
            version: Cell::new(None),
            value: RefCell::new(Rc::new(empty)),
        }
    }

    fn get_or_rebuild(&self, version: u64, rebuild: impl FnOnce() -> T) -> Rc<T> {
        if self.version.get() != Some(version) {
            let rebuilt = Rc::new(rebuild());
            *self.value.borrow_mut() = rebuilt;
            self.version.set(Some(version));
        }
        Rc::clone(&self.value.borrow())
    }
}

/// Combined visible snapshot across the four scheduled categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleObjects {
    pub npcs: Rc<Vec<ObjectId>>,
    pub items: Rc<Vec<ObjectId>>,
    pub script_objects: Rc<Vec<ObjectId>>,
    pub large_objects: Rc<Vec<ObjectId>>,
}

impl VisibleObjects {
    pub fn total(&self) -> usize {
        self.npcs.len() + self.items.len() + self.script_objects.len() + self.large_objects.len()
    }
}

pub(crate) struct VisibilityCache {
    npcs: VersionedView<Vec<ObjectId>>,
    items: VersionedView<Vec<ObjectId>>,
    script_objects: VersionedView<Vec<ObjectId>>,
    large_objects: VersionedView<Vec<ObjectId>>,
    combined: VersionedView<VisibleObjects>,
    rebuilds: Cell<u64>,
}

impl Default for VisibilityCache {
    fn default() -> Self {
        Self {
            npcs: VersionedView::new(Vec::new()),
            items: VersionedView::new(Vec::new()),
            script_objects: VersionedView::new(Vec::new()),
            large_objects: VersionedView::new(Vec::new()),
            combined: VersionedView::new(VisibleObjects::default()),
            rebuilds: Cell::new(0),
        }
    }
}

impl VisibilityCache {
    pub(crate) fn npcs(&self, tables: &Tracked<Tables>) -> Rc<Vec<ObjectId>> {
        self.npcs.get_or_rebuild(tables.version(), || {
            self.count_rebuild();
            filter_ids(&tables.npcs, |npc| tables.npc_present(npc))
        })
    }

    pub(crate) fn items(&self, tables: &Tracked<Tables>) -> Rc<Vec<ObjectId>> {
        self.items.get_or_rebuild(tables.version(), || {
            self.count_rebuild();
            filter_ids(&tables.items, |item| tables.item_present(item))
        })
    }

    pub(crate) fn script_objects(&self, tables: &Tracked<Tables>) -> Rc<Vec<ObjectId>> {
        self.script_objects.get_or_rebuild(tables.version(), || {
            self.count_rebuild();
            filter_ids(&tables.script_objects, |object| {
                tables.script_object_present(object)
            })
        })
    }

    pub(crate) fn large_objects(&self, tables: &Tracked<Tables>) -> Rc<Vec<ObjectId>> {
        self.large_objects.get_or_rebuild(tables.version(), || {
            self.count_rebuild();
            filter_ids(&tables.large_objects, |object| {
                tables.large_object_present(object)
            })
        })
    }

    pub(crate) fn combined(&self, tables: &Tracked<Tables>) -> Rc<VisibleObjects> {
        self.combined.get_or_rebuild(tables.version(), || VisibleObjects {
            npcs: self.npcs(tables),
            items: self.items(tables),
            script_objects: self.script_objects(tables),
            large_objects: self.large_objects(tables),
        })
    }

    /// Number of per-category filter passes performed so far.
    pub(crate) fn rebuild_count(&self) -> u64 {
        self.rebuilds.get()
    }

    fn count_rebuild(&self) {
        self.rebuilds.set(self.rebuilds.get() + 1);
    }
}

fn filter_ids<T>(table: &BTreeMap<ObjectId, T>, present: impl Fn(&T) -> bool) -> Vec<ObjectId> {
    table
        .iter()
        .filter(|(_, record)| present(record))
        .map(|(id, _)| id.clone())
        .collect()
}

/// Borrowed view over one category's visible records, in id order.
pub struct VisibleSet<'a, T> {
    ids: Rc<Vec<ObjectId>>,
    table: &'a BTreeMap<ObjectId, T>,
}

impl<'a, T> VisibleSet<'a, T> {
    pub(crate) fn new(ids: Rc<Vec<ObjectId>>, table: &'a BTreeMap<ObjectId, T>) -> Self {
        Self { ids, table }
    }

    pub fn ids(&self) -> &Rc<Vec<ObjectId>> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        let table = self.table;
        self.ids.iter().filter_map(move |id| table.get(id))
    }
}
