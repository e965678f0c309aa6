use super::handle::Id;

/// Append-only registry addressed by [`Id`].
///
/// Entries are never removed one at a time, so an ID stays valid until the
/// whole table is cleared.
pub struct ResourceTable<T> {
    items: Vec<T>,
}

impl<T> Default for ResourceTable<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> ResourceTable<T> {
    pub fn insert(&mut self, item: T) -> Id<T> {
        let id = Id::from_index(self.items.len());
        self.items.push(item);
        id
    }

    /// Bounds-checked lookup. An out-of-range ID is a caller bug, not a
    /// recoverable condition.
    pub fn get(&self, id: Id<T>) -> &T {
        match self.try_get(id) {
            Some(item) => item,
            None => panic!(
                "resource id {} out of range (table holds {} entries)",
                id.raw(),
                self.items.len()
            ),
        }
    }

    pub fn get_mut(&mut self, id: Id<T>) -> &mut T {
        let len = self.items.len();
        match id.index().and_then(|idx| self.items.get_mut(idx)) {
            Some(item) => item,
            None => panic!(
                "resource id {} out of range (table holds {} entries)",
                id.raw(),
                len
            ),
        }
    }

    pub fn try_get(&self, id: Id<T>) -> Option<&T> {
        self.items.get(id.index()?)
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.try_get(id).is_some()
    }

    /// Linear scan, first match wins.
    pub fn find(&self, mut pred: impl FnMut(&T) -> bool) -> Option<Id<T>> {
        self.items.iter().position(|item| pred(item)).map(Id::from_index)
    }

    pub fn first_id(&self) -> Option<Id<T>> {
        (!self.items.is_empty()).then(|| Id::from_index(0))
    }

    /// Empties the table, handing every entry back in insertion order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
