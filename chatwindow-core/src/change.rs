use crate::message::Message;
use log::debug;
use std::collections::HashSet;

/// Items that carry a stable identity within an ordered list.
pub trait Identified {
    fn identity(&self) -> &str;
}

impl Identified for Message {
    fn identity(&self) -> &str {
        &self.id
    }
}

/// One step of a list mutation. Indices refer to the list as left by the
/// previous entries of the same batch, so a batch must be replayed in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange<T> {
    Insert { item: T, index: usize },
    Update { item: T, index: usize },
    Remove { item: T, index: usize },
    Move { item: T, from: usize, to: usize },
}

pub type ChangeSet = Vec<ListChange<Message>>;

impl<T> ListChange<T> {
    pub fn item(&self) -> &T {
        match self {
            ListChange::Insert { item, .. }
            | ListChange::Update { item, .. }
            | ListChange::Remove { item, .. }
            | ListChange::Move { item, .. } => item,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, ListChange::Insert { .. })
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, ListChange::Remove { .. })
    }
}

fn position_of<T: Identified>(items: &[T], id: &str) -> Option<usize> {
    items.iter().position(|item| item.identity() == id)
}

/// Replays `changes` onto `items`.
///
/// Entries whose index no longer matches the identity they carry are resolved
/// by identity instead, and an insert of an identity that is already present
/// replaces the existing entry, so the result never holds duplicates.
pub fn apply<T: Identified + Clone>(items: &mut Vec<T>, changes: &[ListChange<T>]) {
    for change in changes {
        match change {
            ListChange::Insert { item, index } => {
                let mut index = *index;
                if let Some(existing) = position_of(items, item.identity()) {
                    items.remove(existing);
                    if existing < index {
                        index -= 1;
                    }
                }
                items.insert(index.min(items.len()), item.clone());
            }
            ListChange::Update { item, index } => {
                let target = match items.get(*index) {
                    Some(current) if current.identity() == item.identity() => Some(*index),
                    _ => position_of(items, item.identity()),
                };
                match target {
                    Some(position) => items[position] = item.clone(),
                    None => debug!("Dropping update for unknown item {}", item.identity()),
                }
            }
            ListChange::Remove { item, index } => {
                let target = match items.get(*index) {
                    Some(current) if current.identity() == item.identity() => Some(*index),
                    _ => position_of(items, item.identity()),
                };
                if let Some(position) = target {
                    items.remove(position);
                }
            }
            ListChange::Move { item, from, to } => {
                let source = match items.get(*from) {
                    Some(current) if current.identity() == item.identity() => Some(*from),
                    _ => position_of(items, item.identity()),
                };
                if let Some(position) = source {
                    items.remove(position);
                }
                items.insert((*to).min(items.len()), item.clone());
            }
        }
    }
}

/// Derives the change set that turns `old` into `new`.
///
/// Entries are emitted as removals (highest index first), insertions
/// (ascending), moves, then in-place updates, so replaying them in order
/// through [`apply`] reproduces `new` exactly.
pub fn diff<T: Identified + Clone + PartialEq>(old: &[T], new: &[T]) -> Vec<ListChange<T>> {
    let new_ids: HashSet<&str> = new.iter().map(Identified::identity).collect();
    let old_ids: HashSet<&str> = old.iter().map(Identified::identity).collect();

    let mut changes = Vec::new();
    let mut current: Vec<T> = old.to_vec();

    for index in (0..old.len()).rev() {
        if !new_ids.contains(old[index].identity()) {
            changes.push(ListChange::Remove {
                item: old[index].clone(),
                index,
            });
            current.remove(index);
        }
    }

    for (index, item) in new.iter().enumerate() {
        if !old_ids.contains(item.identity()) {
            changes.push(ListChange::Insert {
                item: item.clone(),
                index,
            });
            current.insert(index.min(current.len()), item.clone());
        }
    }

    for (index, item) in new.iter().enumerate() {
        match current.get(index) {
            Some(existing) if existing.identity() == item.identity() => continue,
            None => break,
            Some(_) => {}
        }
        if let Some(from) = position_of(&current[index..], item.identity()).map(|p| p + index) {
            let moved = current.remove(from);
            current.insert(index, moved);
            changes.push(ListChange::Move {
                item: item.clone(),
                from,
                to: index,
            });
        }
    }

    for (index, item) in new.iter().enumerate() {
        if current.get(index).is_some_and(|existing| existing != item) {
            changes.push(ListChange::Update {
                item: item.clone(),
                index,
            });
        }
    }

    changes
}
