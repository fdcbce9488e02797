use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};

use crate::error::{DashboardError, Result};

pub const LOADING_PATH: &str = "loading";
pub const INITIAL_LOAD_PATH: &str = "initialLoad";
pub const DATA_PATH: &str = "data";

pub type Callback = Arc<dyn Fn(&JsonValue) + Send + Sync>;

type Branch = BTreeMap<String, Slot>;

#[derive(Clone)]
enum Slot {
    Leaf(Arc<JsonValue>),
    Branch(Arc<Branch>),
}

impl Slot {
    fn from_value(v: JsonValue) -> Self {
        match v {
            JsonValue::Object(map) => Slot::Branch(Arc::new(
                map.into_iter()
                    .map(|(k, v)| (k, Slot::from_value(v)))
                    .collect(),
            )),
            other => Slot::Leaf(Arc::new(other)),
        }
    }

    fn to_value(&self) -> JsonValue {
        match self {
            Slot::Leaf(v) => v.as_ref().clone(),
            Slot::Branch(b) => branch_to_value(b),
        }
    }

    fn same(&self, other: &Slot) -> bool {
        match (self, other) {
            (Slot::Leaf(a), Slot::Leaf(b)) => Arc::ptr_eq(a, b),
            (Slot::Branch(a), Slot::Branch(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn branch_to_value(b: &Branch) -> JsonValue {
    let map: Map<String, JsonValue> = b.iter().map(|(k, s)| (k.clone(), s.to_value())).collect();
    JsonValue::Object(map)
}

fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn resolve<'a>(root: &'a Branch, path: &[&str]) -> Option<&'a Slot> {
    let (first, rest) = path.split_first()?;
    let slot = root.get(*first)?;
    if rest.is_empty() {
        return Some(slot);
    }
    match slot {
        Slot::Branch(b) => resolve(b, rest),
        Slot::Leaf(_) => None,
    }
}

fn replace_in(branch: &Branch, path: &[&str], new: Slot) -> Option<Branch> {
    let (first, rest) = path.split_first()?;
    let mut next = branch.clone();
    if rest.is_empty() {
        next.insert((*first).to_string(), new);
        return Some(next);
    }
    let child = match branch.get(*first)? {
        Slot::Branch(b) => replace_in(b, rest, new)?,
        Slot::Leaf(_) => return None,
    };
    next.insert((*first).to_string(), Slot::Branch(Arc::new(child)));
    Some(next)
}

fn related(a: &str, b: &str) -> bool {
    a == b
        || (a.len() > b.len() && a.starts_with(b) && a.as_bytes()[b.len()] == b'.')
        || (b.len() > a.len() && b.starts_with(a) && b.as_bytes()[a.len()] == b'.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    path: String,
    callback: Callback,
}

struct Inner {
    root: Arc<Branch>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

#[derive(Clone)]
pub struct SlotRef(Slot);

impl SlotRef {
    pub fn same_as(&self, other: &SlotRef) -> bool {
        self.0.same(&other.0)
    }
}

#[derive(Clone)]
pub struct DashboardStore {
    inner: Arc<RwLock<Inner>>,
}

impl DashboardStore {
    pub fn new(root: JsonValue) -> Self {
        let root = match Slot::from_value(root) {
            Slot::Branch(b) => b,
            Slot::Leaf(_) => Arc::new(Branch::new()),
        };
        Self {
            inner: Arc::new(RwLock::new(Inner {
                root,
                subscribers: Vec::new(),
                next_id: 1,
            })),
        }
    }

    pub fn for_dashboard(initial_data: JsonValue) -> Self {
        Self::new(serde_json::json!({
            "filter": {},
            "data": initial_data,
            "loading": false,
            "initialLoad": true,
        }))
    }

    pub fn get(&self, path: &str) -> Option<JsonValue> {
        let segs = segments(path);
        let inner = self.inner.read();
        resolve(&inner.root, &segs).map(Slot::to_value)
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn slot_ref(&self, path: &str) -> Option<SlotRef> {
        let segs = segments(path);
        let inner = self.inner.read();
        resolve(&inner.root, &segs).cloned().map(SlotRef)
    }

    pub fn snapshot(&self) -> JsonValue {
        let inner = self.inner.read();
        branch_to_value(&inner.root)
    }

    /// Replace the slot at `path` with `value`.
    ///
    /// The parent of `path` must already exist. Observers whose slot
    /// identity changed are called after the write lock is released, in
    /// registration order, so they may write to the store themselves.
    pub fn set(&self, path: &str, value: JsonValue) -> Result<()> {
        let segs = segments(path);
        if segs.is_empty() {
            return Err(DashboardError::MissingParent {
                path: path.to_string(),
            });
        }
        let norm = segs.join(".");
        let new_slot = Slot::from_value(value);

        let fired: Vec<(Callback, JsonValue)> = {
            let mut inner = self.inner.write();
            let old_root = inner.root.clone();
            let new_root = replace_in(&old_root, &segs, new_slot).ok_or_else(|| {
                DashboardError::MissingParent {
                    path: path.to_string(),
                }
            })?;
            let new_root = Arc::new(new_root);
            inner.root = new_root.clone();

            inner
                .subscribers
                .iter()
                .filter(|s| related(&s.path, &norm))
                .filter_map(|s| {
                    let sub_segs = segments(&s.path);
                    let before = resolve(&old_root, &sub_segs);
                    let after = resolve(&new_root, &sub_segs);
                    let changed = match (before, after) {
                        (Some(a), Some(b)) => !a.same(b),
                        (None, None) => false,
                        _ => true,
                    };
                    changed.then(|| {
                        let v = after.map(Slot::to_value).unwrap_or(JsonValue::Null);
                        (s.callback.clone(), v)
                    })
                })
                .collect()
        };

        for (cb, v) in fired {
            cb(&v);
        }
        Ok(())
    }

    pub fn observe<F>(&self, path: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&JsonValue) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            path: segments(path).join("."),
            callback: Arc::new(callback),
        });
        id
    }

    pub fn unobserve(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        inner.subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().subscribers.len()
    }
}
