use std::fmt;

use super::PAGE_SIZE;

/// Page identifier type - uniquely identifies a page on disk.
/// The page lives at byte offset `page_id * PAGE_SIZE` in the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns false for the `INVALID_PAGE_ID` sentinel.
    pub fn is_valid(&self) -> bool {
        *self != INVALID_PAGE_ID
    }

    /// Byte offset of this page in the database file.
    pub fn offset(&self) -> u64 {
        self.0 as u64 * PAGE_SIZE as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "PageId({})", self.0)
        } else {
            write!(f, "PageId(INVALID)")
        }
    }
}

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Frame identifier type - identifies a buffer frame in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Timestamp type for replacer bookkeeping
pub type Timestamp = u64;

/// LSN (Log Sequence Number) produced by the write-ahead log
pub type Lsn = u64;

/// "No associated log record"
pub const INVALID_LSN: Lsn = 0;

/// Largest representable LSN, reported by a log that is always durable
pub const MAX_LSN: Lsn = u64::MAX;

/// Transaction identifier
pub type TransactionId = u32;

pub const INVALID_XID: TransactionId = 0;
pub const BOOTSTRAP_XID: TransactionId = 1;
pub const FROZEN_XID: TransactionId = 2;
pub const FIRST_NORMAL_XID: TransactionId = 3;

/// Catalog object identifier
pub type Oid = u32;

pub const INVALID_OID: Oid = 0;

/// Physical tuple address: the page holding the tuple plus its slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TupleId {
    pub page_id: PageId,
    pub slot_num: u16,
}

impl TupleId {
    pub fn new(page_id: PageId, slot_num: u16) -> Self {
        Self { page_id, slot_num }
    }

    pub fn is_valid(&self) -> bool {
        self.page_id.is_valid()
    }
}

pub const INVALID_TUPLE_ID: TupleId = TupleId {
    page_id: INVALID_PAGE_ID,
    slot_num: 0,
};

/// Column type tags used by the catalog and the type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeId {
    Invalid = 0,
    Boolean = 1,
    TinyInt = 2,
    SmallInt = 3,
    Integer = 4,
    BigInt = 5,
    Decimal = 6,
    Float = 7,
    Double = 8,
    Timestamp = 9,
    Date = 10,
    Varchar = 11,
    Text = 12,
}

impl TryFrom<u8> for TypeId {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        Ok(match value {
            0 => TypeId::Invalid,
            1 => TypeId::Boolean,
            2 => TypeId::TinyInt,
            3 => TypeId::SmallInt,
            4 => TypeId::Integer,
            5 => TypeId::BigInt,
            6 => TypeId::Decimal,
            7 => TypeId::Float,
            8 => TypeId::Double,
            9 => TypeId::Timestamp,
            10 => TypeId::Date,
            11 => TypeId::Varchar,
            12 => TypeId::Text,
            other => return Err(other),
        })
    }
}
