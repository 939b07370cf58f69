//! Cache item model as seen by the snapshot subsystem.
//!
//! The hash table and item allocator own item memory. Snapshot code only
//! reads these fields to serialize them, and hands decoded copies back to
//! the engine's redo path during recovery.

use thiserror::Error;

/// Item kind, one per top-level value shape the cache stores.
///
/// Everything except `Kv` is a collection: its value is an ordered or keyed
/// set of elements served by the collection subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemType {
    /// Plain key-value item.
    Kv,
    /// List collection.
    List,
    /// Set collection.
    Set,
    /// Map collection.
    Map,
    /// B+tree collection.
    Btree,
}

/// Error for an item-type byte that does not name a known kind.
#[derive(Debug, Error)]
#[error("unknown item type: {0}")]
pub struct UnknownItemType(pub u8);

impl ItemType {
    /// One-character tag used by the key-listing snapshot format.
    pub fn tag(&self) -> char {
        match self {
            ItemType::Kv => 'K',
            ItemType::List => 'L',
            ItemType::Set => 'S',
            ItemType::Map => 'M',
            ItemType::Btree => 'B',
        }
    }

    /// Raw byte used by the binary record format.
    pub fn as_u8(&self) -> u8 {
        match self {
            ItemType::Kv => 0,
            ItemType::List => 1,
            ItemType::Set => 2,
            ItemType::Map => 3,
            ItemType::Btree => 4,
        }
    }

    /// Decode the raw byte written by [`ItemType::as_u8`].
    pub fn from_u8(raw: u8) -> Result<Self, UnknownItemType> {
        match raw {
            0 => Ok(ItemType::Kv),
            1 => Ok(ItemType::List),
            2 => Ok(ItemType::Set),
            3 => Ok(ItemType::Map),
            4 => Ok(ItemType::Btree),
            other => Err(UnknownItemType(other)),
        }
    }

    /// True for every kind whose value is a collection of elements.
    pub fn is_collection(&self) -> bool {
        !matches!(self, ItemType::Kv)
    }
}

/// Expiration state of an item, in engine logical seconds.
///
/// The engine's logical clock starts at 1, so `At(0)` is never constructed;
/// raw value 0 always means [`Expiry::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// The item never expires.
    Never,
    /// The item is pinned: never expires and never evicted.
    Sticky,
    /// The item expires at the given engine logical time.
    At(u32),
}

impl Expiry {
    /// Signed raw encoding used by the binary record format:
    /// `0` = never, `-1` = sticky, positive = absolute logical time.
    pub fn to_raw(self) -> i64 {
        match self {
            Expiry::Never => 0,
            Expiry::Sticky => -1,
            Expiry::At(t) => i64::from(t),
        }
    }

    /// Decode the raw encoding written by [`Expiry::to_raw`].
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Expiry::Never),
            -1 => Some(Expiry::Sticky),
            t if t > 0 && t <= i64::from(u32::MAX) => Some(Expiry::At(t as u32)),
            _ => None,
        }
    }
}

/// One stored key-value (or key-collection) entry in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Raw key bytes.
    pub key: Vec<u8>,
    /// Value shape of this item.
    pub item_type: ItemType,
    /// Client-opaque flags stored with the item.
    pub flags: u32,
    /// Expiration state.
    pub expiry: Expiry,
    /// Opaque value payload. For collection items this holds the
    /// collection's own metadata; the elements travel separately.
    pub value: Vec<u8>,
}

impl Item {
    /// True when the item's value is a collection of elements.
    pub fn is_collection(&self) -> bool {
        self.item_type.is_collection()
    }
}

/// One opaque collection-element payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Serialized element bytes, owned by the collection subsystem's format.
    pub payload: Vec<u8>,
}

/// Reusable holder for one scan slot's collection elements.
///
/// The scan-drain loop allocates one holder per batch slot and reuses it
/// across batches, so element memory is recycled rather than reallocated.
#[derive(Debug, Default)]
pub struct ElemsResult {
    /// Elements of the collection item in this slot, in collection order.
    pub elements: Vec<Element>,
}

impl ElemsResult {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the held elements, keeping the allocation for the next batch.
    pub fn reset(&mut self) {
        self.elements.clear();
    }
}
