//! Ordered-list reconciler
//!
//! Pure functions that turn a drag-and-drop gesture into a new in-memory sequence
//! plus the persisted changes needed to reach it. The same functions back board
//! column moves, field order, status order and the form-builder canvas, so none of
//! them knows how (or whether) the result is written anywhere.

use corkboard_api::{Entry, Field, FormField, Status, ValidationError};

type ReorderResult<T> = std::result::Result<T, ValidationError>;

/// Items with a stable identity.
pub trait Identified {
    fn id(&self) -> &str;
}

/// Items that persist their position as a dense integer `order`.
pub trait Ordered: Identified {
    fn order(&self) -> i64;
    fn set_order(&mut self, order: i64);
}

/// Items that persist group membership (an entry's `status_id`).
pub trait Grouped<G>: Identified {
    fn assign_group(&mut self, group: &G);
}

impl Identified for Field {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Ordered for Field {
    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

impl Identified for Status {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Ordered for Status {
    fn order(&self) -> i64 {
        self.order
    }

    fn set_order(&mut self, order: i64) {
        self.order = order;
    }
}

impl Identified for FormField {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Entry {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Grouped<String> for Entry {
    fn assign_group(&mut self, group: &String) {
        self.status_id = Some(group.clone());
    }
}

/// One end of a drag gesture. Ungrouped lists use `G = ()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropLocation<G> {
    pub group: G,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragGesture<G> {
    pub source: DropLocation<G>,
    pub destination: DropLocation<G>,
}

impl DragGesture<()> {
    /// A move inside a single ungrouped list.
    pub fn within(from: usize, to: usize) -> Self {
        Self {
            source: DropLocation {
                group: (),
                index: from,
            },
            destination: DropLocation { group: (), index: to },
        }
    }
}

impl<G: PartialEq> DragGesture<G> {
    pub fn between(from_group: G, from: usize, to_group: G, to: usize) -> Self {
        Self {
            source: DropLocation {
                group: from_group,
                index: from,
            },
            destination: DropLocation {
                group: to_group,
                index: to,
            },
        }
    }

    /// Dropping an item where it was picked up.
    pub fn is_noop(&self) -> bool {
        self.source == self.destination
    }

    pub fn crosses_groups(&self) -> bool {
        self.source.group != self.destination.group
    }
}

/// A persisted `order` value that has to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    pub id: String,
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reordered<T> {
    pub items: Vec<T>,
    pub changes: Vec<OrderChange>,
}

impl<T> Reordered<T> {
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }
}

fn out_of_range(what: &str, index: usize, len: usize) -> ValidationError {
    ValidationError::InvalidGesture {
        reason: format!("{} index {} is outside 0..{}", what, index, len),
    }
}

/// Move the item at `from` so that it ends up at `to`.
pub fn reorder<T: Clone>(items: &[T], from: usize, to: usize) -> ReorderResult<Vec<T>> {
    if from >= items.len() {
        return Err(out_of_range("source", from, items.len()));
    }
    if to >= items.len() {
        return Err(out_of_range("destination", to, items.len()));
    }
    let mut next = items.to_vec();
    if from != to {
        let moved = next.remove(from);
        next.insert(to, moved);
    }
    Ok(next)
}

/// Rewrite `order` as the position in `items` and report every item whose value
/// changed.
pub fn densify<T: Ordered>(items: &mut [T]) -> Vec<OrderChange> {
    items
        .iter_mut()
        .enumerate()
        .filter_map(|(position, item)| {
            let to = position as i64;
            let from = item.order();
            if from == to {
                return None;
            }
            item.set_order(to);
            Some(OrderChange {
                id: item.id().to_string(),
                from,
                to,
            })
        })
        .collect()
}

/// `true` when the order values are exactly `0..n` in sequence.
pub fn is_dense<T: Ordered>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(position, item)| item.order() == position as i64)
}

/// Reorder a list that persists `order` and recompute dense indices.
///
/// `items` must be sorted by order. Dropping an item onto its own position returns
/// the input unchanged with no changes.
pub fn reorder_ordered<T: Ordered + Clone>(
    items: &[T],
    from: usize,
    to: usize,
) -> ReorderResult<Reordered<T>> {
    let mut next = reorder(items, from, to)?;
    if from == to {
        return Ok(Reordered {
            items: next,
            changes: Vec::new(),
        });
    }
    let changes = densify(&mut next);
    Ok(Reordered {
        items: next,
        changes,
    })
}

/// Arrange `items` in the order given by `sequence` (a permutation of their ids) and
/// recompute dense indices.
pub fn apply_sequence<T: Ordered + Clone>(
    items: &[T],
    sequence: &[String],
) -> ReorderResult<Reordered<T>> {
    if sequence.len() != items.len() {
        return Err(ValidationError::SequenceMismatch {
            reason: format!("expected {} ids, got {}", items.len(), sequence.len()),
        });
    }
    let mut next = Vec::with_capacity(items.len());
    for id in sequence {
        if next.iter().any(|item: &T| item.id() == id) {
            return Err(ValidationError::SequenceMismatch {
                reason: format!("{} appears twice", id),
            });
        }
        let item = items
            .iter()
            .find(|item| item.id() == id)
            .ok_or_else(|| ValidationError::SequenceMismatch {
                reason: format!("{} is not part of the list", id),
            })?;
        next.push(item.clone());
    }
    let changes = densify(&mut next);
    Ok(Reordered {
        items: next,
        changes,
    })
}

/// A named group of items, e.g. one board column.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<G, T> {
    pub key: G,
    pub items: Vec<T>,
}

/// An item that moved from one group to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange<G> {
    pub item_id: String,
    pub from_group: G,
    pub to_group: G,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupedMove<G, T> {
    pub groups: Vec<Group<G, T>>,
    /// `None` when the item stayed in its group.
    pub membership: Option<MembershipChange<G>>,
}

/// Move an item between (or within) groups.
///
/// Position inside a group is not persisted, so the only persisted change is the
/// membership of the moved item when it crosses groups.
pub fn move_between_groups<G, T>(
    groups: &[Group<G, T>],
    gesture: &DragGesture<G>,
) -> ReorderResult<GroupedMove<G, T>>
where
    G: Clone + PartialEq + std::fmt::Debug,
    T: Grouped<G> + Clone,
{
    let locate = |key: &G| {
        groups
            .iter()
            .position(|g| &g.key == key)
            .ok_or_else(|| ValidationError::InvalidGesture {
                reason: format!("unknown group {:?}", key),
            })
    };
    let source = locate(&gesture.source.group)?;
    let destination = locate(&gesture.destination.group)?;

    if gesture.is_noop() {
        return Ok(GroupedMove {
            groups: groups.to_vec(),
            membership: None,
        });
    }

    if source == destination {
        let items = reorder(
            &groups[source].items,
            gesture.source.index,
            gesture.destination.index,
        )?;
        let mut next = groups.to_vec();
        next[source].items = items;
        return Ok(GroupedMove {
            groups: next,
            membership: None,
        });
    }

    let source_len = groups[source].items.len();
    if gesture.source.index >= source_len {
        return Err(out_of_range("source", gesture.source.index, source_len));
    }
    let destination_len = groups[destination].items.len();
    if gesture.destination.index > destination_len {
        return Err(out_of_range(
            "destination",
            gesture.destination.index,
            destination_len + 1,
        ));
    }

    let mut next = groups.to_vec();
    let mut moved = next[source].items.remove(gesture.source.index);
    moved.assign_group(&next[destination].key);
    let membership = MembershipChange {
        item_id: moved.id().to_string(),
        from_group: next[source].key.clone(),
        to_group: next[destination].key.clone(),
    };
    next[destination]
        .items
        .insert(gesture.destination.index, moved);

    Ok(GroupedMove {
        groups: next,
        membership: Some(membership),
    })
}
