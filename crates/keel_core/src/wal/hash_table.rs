//! Log records for mutations of local hash tables.
//!
//! Every record starts with a [`LocalHashTableOperation`]: the operation unit
//! id and the name of the table it applies to, since one log interleaves
//! records for many tables. Each kind appends its own payload after that
//! base:
//!
//! ```text
//! | unit id (16) | name_len (4) | name (utf-8) | payload ... |
//! ```
//!
//! Records carry no kind discriminant of their own. The log framing stores a
//! [`HashTableOperationKind`] next to each body and dispatches to the
//! matching decoder.

use crate::codec::{prefixed_size, ByteReader, ByteSink};
use crate::error::{CoreError, CoreResult};
use crate::types::OperationUnitId;
use crate::wal::operation::{check_prefixable, ComponentOperation};
use bytes::BufMut;

/// Kind tag for hash-table records, stored by the log framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HashTableOperationKind {
    /// A table was created.
    Create = 1,
    /// An entry was inserted or replaced.
    Put = 2,
    /// An entry was removed.
    Remove = 3,
    /// The table's capacity changed.
    Resize = 4,
}

impl HashTableOperationKind {
    /// Every kind, in tag order.
    pub const ALL: [Self; 4] = [Self::Create, Self::Put, Self::Remove, Self::Resize];

    /// Converts a tag byte to a kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Create),
            2 => Some(Self::Put),
            3 => Some(Self::Remove),
            4 => Some(Self::Resize),
            _ => None,
        }
    }

    /// Converts the kind to its tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Upper-case label used by tooling output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Put => "PUT",
            Self::Remove => "REMOVE",
            Self::Resize => "RESIZE",
        }
    }
}

/// Base of every hash-table record: operation unit id plus table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalHashTableOperation {
    unit_id: OperationUnitId,
    name: String,
}

impl LocalHashTableOperation {
    /// Creates the base for a record on table `name`.
    pub fn new(unit_id: OperationUnitId, name: impl Into<String>) -> Self {
        Self {
            unit_id,
            name: name.into(),
        }
    }

    /// Name of the table this record applies to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ComponentOperation for LocalHashTableOperation {
    fn operation_unit_id(&self) -> OperationUnitId {
        self.unit_id
    }

    fn serialized_size(&self) -> usize {
        OperationUnitId::SERIALIZED_SIZE + prefixed_size(self.name.len())
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_argument("hash table name must not be empty"));
        }
        check_prefixable("hash table name", self.name.as_bytes())
    }

    fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        self.unit_id.encode(sink);
        sink.put_prefixed(self.name.as_bytes());
    }

    fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        let unit_id = OperationUnitId::decode(reader)?;
        let name = reader.read_string()?;
        if name.is_empty() {
            return Err(CoreError::decode("empty hash table name"));
        }
        Ok(Self { unit_id, name })
    }
}

/// A table was created with the given engine version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreateTable {
    /// Unit id and table name.
    pub base: LocalHashTableOperation,
    /// Engine format version of the new table.
    pub engine_version: u32,
}

impl ComponentOperation for CreateTable {
    fn operation_unit_id(&self) -> OperationUnitId {
        self.base.operation_unit_id()
    }

    fn serialized_size(&self) -> usize {
        self.base.serialized_size() + 4
    }

    fn validate(&self) -> CoreResult<()> {
        self.base.validate()
    }

    fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        self.base.encode(sink);
        sink.put_u32(self.engine_version);
    }

    fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        let base = LocalHashTableOperation::decode(reader)?;
        let engine_version = reader.read_u32()?;
        Ok(Self {
            base,
            engine_version,
        })
    }
}

/// An entry was inserted or replaced.
///
/// `old_value` is the before-image, `None` when the key was absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PutEntry {
    /// Unit id and table name.
    pub base: LocalHashTableOperation,
    /// Encoded key.
    pub key: Vec<u8>,
    /// Encoded new value.
    pub value: Vec<u8>,
    /// Encoded previous value.
    pub old_value: Option<Vec<u8>>,
}

impl ComponentOperation for PutEntry {
    fn operation_unit_id(&self) -> OperationUnitId {
        self.base.operation_unit_id()
    }

    fn serialized_size(&self) -> usize {
        self.base.serialized_size()
            + prefixed_size(self.key.len())
            + prefixed_size(self.value.len())
            + optional_size(self.old_value.as_deref())
    }

    fn validate(&self) -> CoreResult<()> {
        self.base.validate()?;
        check_prefixable("key", &self.key)?;
        check_prefixable("value", &self.value)?;
        if let Some(old) = &self.old_value {
            check_prefixable("old value", old)?;
        }
        Ok(())
    }

    fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        self.base.encode(sink);
        sink.put_prefixed(&self.key);
        sink.put_prefixed(&self.value);
        sink.put_optional(self.old_value.as_deref());
    }

    fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        let base = LocalHashTableOperation::decode(reader)?;
        let key = reader.read_prefixed()?.to_vec();
        let value = reader.read_prefixed()?.to_vec();
        let old_value = reader.read_optional()?.map(<[u8]>::to_vec);
        Ok(Self {
            base,
            key,
            value,
            old_value,
        })
    }
}

/// An entry was removed. `old_value` is the value it held.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoveEntry {
    /// Unit id and table name.
    pub base: LocalHashTableOperation,
    /// Encoded key.
    pub key: Vec<u8>,
    /// Encoded removed value.
    pub old_value: Option<Vec<u8>>,
}

impl ComponentOperation for RemoveEntry {
    fn operation_unit_id(&self) -> OperationUnitId {
        self.base.operation_unit_id()
    }

    fn serialized_size(&self) -> usize {
        self.base.serialized_size()
            + prefixed_size(self.key.len())
            + optional_size(self.old_value.as_deref())
    }

    fn validate(&self) -> CoreResult<()> {
        self.base.validate()?;
        check_prefixable("key", &self.key)?;
        if let Some(old) = &self.old_value {
            check_prefixable("old value", old)?;
        }
        Ok(())
    }

    fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        self.base.encode(sink);
        sink.put_prefixed(&self.key);
        sink.put_optional(self.old_value.as_deref());
    }

    fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        let base = LocalHashTableOperation::decode(reader)?;
        let key = reader.read_prefixed()?.to_vec();
        let old_value = reader.read_optional()?.map(<[u8]>::to_vec);
        Ok(Self {
            base,
            key,
            old_value,
        })
    }
}

/// The table was resized from `old_capacity` to `new_capacity` entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResizeTable {
    /// Unit id and table name.
    pub base: LocalHashTableOperation,
    /// Capacity before the resize.
    pub old_capacity: u64,
    /// Capacity after the resize.
    pub new_capacity: u64,
}

impl ComponentOperation for ResizeTable {
    fn operation_unit_id(&self) -> OperationUnitId {
        self.base.operation_unit_id()
    }

    fn serialized_size(&self) -> usize {
        self.base.serialized_size() + 16
    }

    fn validate(&self) -> CoreResult<()> {
        self.base.validate()
    }

    fn encode<S: ByteSink + ?Sized>(&self, sink: &mut S) {
        self.base.encode(sink);
        sink.put_u64(self.old_capacity);
        sink.put_u64(self.new_capacity);
    }

    fn decode(reader: &mut ByteReader<'_>) -> CoreResult<Self> {
        let base = LocalHashTableOperation::decode(reader)?;
        let old_capacity = reader.read_u64()?;
        let new_capacity = reader.read_u64()?;
        Ok(Self {
            base,
            old_capacity,
            new_capacity,
        })
    }
}

fn optional_size(bytes: Option<&[u8]>) -> usize {
    1 + bytes.map_or(0, |b| prefixed_size(b.len()))
}

/// Any hash-table record, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashTableOperation {
    /// See [`CreateTable`].
    Create(CreateTable),
    /// See [`PutEntry`].
    Put(PutEntry),
    /// See [`RemoveEntry`].
    Remove(RemoveEntry),
    /// See [`ResizeTable`].
    Resize(ResizeTable),
}

impl HashTableOperation {
    /// Returns the kind tag the log framing stores for this record.
    #[must_use]
    pub fn kind(&self) -> HashTableOperationKind {
        match self {
            Self::Create(_) => HashTableOperationKind::Create,
            Self::Put(_) => HashTableOperationKind::Put,
            Self::Remove(_) => HashTableOperationKind::Remove,
            Self::Resize(_) => HashTableOperationKind::Resize,
        }
    }

    /// Returns the shared base of the record.
    #[must_use]
    pub fn base(&self) -> &LocalHashTableOperation {
        match self {
            Self::Create(op) => &op.base,
            Self::Put(op) => &op.base,
            Self::Remove(op) => &op.base,
            Self::Resize(op) => &op.base,
        }
    }

    /// Name of the table the record applies to.
    #[must_use]
    pub fn name(&self) -> &str {
        self.base().name()
    }

    /// The atomic operation the record belongs to.
    #[must_use]
    pub fn operation_unit_id(&self) -> OperationUnitId {
        self.base().operation_unit_id()
    }

    /// Exact encoded body size.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        match self {
            Self::Create(op) => op.serialized_size(),
            Self::Put(op) => op.serialized_size(),
            Self::Remove(op) => op.serialized_size(),
            Self::Resize(op) => op.serialized_size(),
        }
    }

    /// Writes the body at `offset` in `buf`; see [`ComponentOperation::to_stream`].
    pub fn to_stream(&self, buf: &mut [u8], offset: usize) -> CoreResult<usize> {
        match self {
            Self::Create(op) => op.to_stream(buf, offset),
            Self::Put(op) => op.to_stream(buf, offset),
            Self::Remove(op) => op.to_stream(buf, offset),
            Self::Resize(op) => op.to_stream(buf, offset),
        }
    }

    /// Writes the body through a cursor; see [`ComponentOperation::to_buf`].
    pub fn to_buf<B: BufMut + ?Sized>(&self, buf: &mut B) -> CoreResult<usize> {
        match self {
            Self::Create(op) => op.to_buf(buf),
            Self::Put(op) => op.to_buf(buf),
            Self::Remove(op) => op.to_buf(buf),
            Self::Resize(op) => op.to_buf(buf),
        }
    }

    /// Encodes the body into a new vector.
    pub fn to_vec(&self) -> CoreResult<Vec<u8>> {
        let mut out = vec![0u8; self.serialized_size()];
        self.to_stream(&mut out, 0)?;
        Ok(out)
    }

    /// Decodes a body of the given kind starting at `offset`, returning the
    /// record and the offset just past it.
    pub fn from_stream(
        kind: HashTableOperationKind,
        buf: &[u8],
        offset: usize,
    ) -> CoreResult<(Self, usize)> {
        Ok(match kind {
            HashTableOperationKind::Create => {
                let (op, end) = CreateTable::from_stream(buf, offset)?;
                (Self::Create(op), end)
            }
            HashTableOperationKind::Put => {
                let (op, end) = PutEntry::from_stream(buf, offset)?;
                (Self::Put(op), end)
            }
            HashTableOperationKind::Remove => {
                let (op, end) = RemoveEntry::from_stream(buf, offset)?;
                (Self::Remove(op), end)
            }
            HashTableOperationKind::Resize => {
                let (op, end) = ResizeTable::from_stream(buf, offset)?;
                (Self::Resize(op), end)
            }
        })
    }

    /// Decodes a complete body of the given kind. Trailing bytes are an error.
    pub fn decode(kind: HashTableOperationKind, body: &[u8]) -> CoreResult<Self> {
        let (op, end) = Self::from_stream(kind, body, 0)?;
        if end != body.len() {
            return Err(CoreError::decode(format!(
                "trailing bytes in {} record: decoded {end} of {} bytes",
                kind.label(),
                body.len()
            )));
        }
        Ok(op)
    }
}

impl From<CreateTable> for HashTableOperation {
    fn from(op: CreateTable) -> Self {
        Self::Create(op)
    }
}

impl From<PutEntry> for HashTableOperation {
    fn from(op: PutEntry) -> Self {
        Self::Put(op)
    }
}

impl From<RemoveEntry> for HashTableOperation {
    fn from(op: RemoveEntry) -> Self {
        Self::Remove(op)
    }
}

impl From<ResizeTable> for HashTableOperation {
    fn from(op: ResizeTable) -> Self {
        Self::Resize(op)
    }
}
