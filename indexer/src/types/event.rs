use std::fmt;

/// Position of an event in the change stream of its table.
///
/// Positions are strictly increasing within a table and carry no meaning across tables.
pub type Position = u64;

/// Kind of committed row mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
        };

        f.write_str(name)
    }
}

/// A committed mutation of a single row.
///
/// Inserts carry only a post-image, deletes only a pre-image and updates both. The event is
/// consumed exactly once by the tailer that polled it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent<R> {
    pub kind: EventKind,
    pub pre: Option<R>,
    pub post: Option<R>,
    pub position: Position,
}

impl<R> ChangeEvent<R> {
    pub fn insert(post: R, position: Position) -> Self {
        Self {
            kind: EventKind::Insert,
            pre: None,
            post: Some(post),
            position,
        }
    }

    pub fn update(pre: R, post: R, position: Position) -> Self {
        Self {
            kind: EventKind::Update,
            pre: Some(pre),
            post: Some(post),
            position,
        }
    }

    pub fn delete(pre: R, position: Position) -> Self {
        Self {
            kind: EventKind::Delete,
            pre: Some(pre),
            post: None,
            position,
        }
    }
}

/// Rows of a dispatched batch, split by mutation kind.
///
/// Each sequence keeps the commit order of its rows. The interleaving of pushed inserts and
/// updates is remembered so that [`Batch::into_upserts`] can restore their commit order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<R> {
    pub added: Vec<R>,
    pub updated: Vec<R>,
    pub removed: Vec<R>,
    upsert_order: Vec<EventKind>,
}

impl<R> Batch<R> {
    pub fn new() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            upsert_order: Vec::new(),
        }
    }

    /// Splits the batch into its added and updated rows in commit order, and its removed rows.
    ///
    /// Rows appended to `added` or `updated` directly, rather than through [`Batch::push`],
    /// follow the ordered rows, added first.
    pub fn into_upserts(self) -> (Vec<R>, Vec<R>) {
        let mut added = self.added.into_iter();
        let mut updated = self.updated.into_iter();

        let mut upserts = Vec::with_capacity(added.len() + updated.len());
        for kind in self.upsert_order {
            let row = match kind {
                EventKind::Update => updated.next(),
                _ => added.next(),
            };
            upserts.extend(row);
        }
        upserts.extend(added);
        upserts.extend(updated);

        (upserts, self.removed)
    }

    /// Moves the row image relevant to the event kind into the batch.
    ///
    /// Inserts and updates contribute their post-image, deletes their pre-image. Returns
    /// `false` when the event lacks that image and nothing was added.
    pub fn push(&mut self, event: ChangeEvent<R>) -> bool {
        let (rows, row) = match event.kind {
            EventKind::Insert => (&mut self.added, event.post),
            EventKind::Update => (&mut self.updated, event.post),
            EventKind::Delete => (&mut self.removed, event.pre),
        };

        match row {
            Some(row) => {
                rows.push(row);
                if event.kind != EventKind::Delete {
                    self.upsert_order.push(event.kind);
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Default for Batch<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FromIterator<ChangeEvent<R>> for Batch<R> {
    fn from_iter<I: IntoIterator<Item = ChangeEvent<R>>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for event in iter {
            batch.push(event);
        }

        batch
    }
}
