use std::collections::{HashMap, VecDeque};

use super::{
    CommandBlob, FieldDef, FieldType, Layout, Record, RelocationKind, RelocationTable, TypeKind,
    TypeRegistry, Value,
};
use crate::format::{FormatError, InternalError};

/// Alignment of vertex buffers and texture payloads in raw data.
pub const RAW_DATA_ALIGNMENT: usize = 0x80;
const INDEX_ALIGNMENT: usize = 0x10;
const COMMAND_ALIGNMENT: usize = 0x10;

/// Section payloads before layout. All pointers hold offsets relative to
/// their target section.
#[derive(Debug, Default)]
pub struct SerializedSections {
    pub contents: Vec<u8>,
    pub strings: Vec<u8>,
    pub commands: Vec<u8>,
    pub raw_data: Vec<u8>,
    pub relocations: RelocationTable,
}

pub struct Serializer<'r> {
    registry: &'r TypeRegistry,
    sections: SerializedSections,
    string_offsets: HashMap<String, u32>,
    /// Records allocated in contents but not yet written.
    pending: VecDeque<(usize, Record)>,
}

impl<'r> Serializer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            sections: SerializedSections::default(),
            string_offsets: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Writes `root` at the start of contents, then everything it reaches,
    /// breadth first.
    pub fn serialize(mut self, root: Record) -> Result<SerializedSections, FormatError> {
        let size = self.registry.get(root.kind)?.size();
        let offset = self.allocate(size);
        self.pending.push_back((offset, root));

        while let Some((offset, record)) = self.pending.pop_front() {
            self.write_record(offset, record)?;
        }

        log::debug!(
            "Serialized contents={} strings={} commands={} raw={} relocations={}",
            self.sections.contents.len(),
            self.sections.strings.len(),
            self.sections.commands.len(),
            self.sections.raw_data.len(),
            self.sections.relocations.len()
        );
        Ok(self.sections)
    }

    fn write_record(&mut self, offset: usize, mut record: Record) -> Result<(), FormatError> {
        let registry = self.registry;
        let def = registry.get(record.kind)?;

        if let Layout::Custom(hook) = &def.layout {
            if hook.serialize(&mut record, self, offset)? {
                return Ok(());
            }
        }
        self.write_fields(offset, record)
    }

    /// Default layout: every non-transient field in table order.
    pub fn write_fields(&mut self, offset: usize, mut record: Record) -> Result<(), FormatError> {
        let registry = self.registry;
        let def = registry.get(record.kind)?;

        let mut cursor = offset;
        for field in &def.fields {
            match field.ty {
                FieldType::Transient => continue,
                FieldType::Padding(count) => {
                    cursor += count;
                    continue;
                }
                _ => {}
            }
            let value = record.take(field.name)?;
            self.write_field(cursor, record.kind, field, value)?;
            cursor += field.ty.inline_size();
        }
        Ok(())
    }

    /// Appends a payload to raw data and returns its offset there.
    pub fn push_raw_data(&mut self, bytes: &[u8], alignment: usize) -> usize {
        let raw = &mut self.sections.raw_data;
        raw.resize(raw.len().next_multiple_of(alignment), 0);
        let offset = raw.len();
        raw.extend_from_slice(bytes);
        offset
    }

    fn write_field(
        &mut self,
        at: usize,
        kind: TypeKind,
        field: &FieldDef,
        value: Value,
    ) -> Result<(), FormatError> {
        let mismatch = || InternalError::FieldTypeMismatch {
            kind,
            field: field.name,
        };

        match (field.ty, value) {
            (FieldType::U8, Value::U8(v)) => self.put(at, &[v]),
            (FieldType::U16, Value::U16(v)) => self.put(at, &v.to_le_bytes()),
            (FieldType::I16, Value::I16(v)) => self.put(at, &v.to_le_bytes()),
            (FieldType::U32, Value::U32(v)) => self.put(at, &v.to_le_bytes()),
            (FieldType::F32, Value::F32(v)) => self.put(at, &v.to_le_bytes()),
            (FieldType::Vector3, Value::Vector3(v)) => self.put_floats(at, &v),
            (FieldType::Matrix3x4, Value::Matrix3x4(m)) => {
                for (row, values) in m.iter().enumerate() {
                    self.put_floats(at + row * 16, values);
                }
            }
            (FieldType::String, Value::String(s)) => {
                if let Some(s) = s {
                    let target = self.intern(&s)?;
                    self.put_pointer(at, target, RelocationKind::StringPtr);
                }
            }
            (FieldType::List(element), Value::List(records)) => {
                if !records.is_empty() {
                    let size = self.registry.get(element)?.size();
                    let base = self.allocate(size * records.len());
                    let count = records.len();
                    for (i, record) in records.into_iter().enumerate() {
                        if record.kind != element {
                            return Err(mismatch().into());
                        }
                        self.pending.push_back((base + i * size, record));
                    }
                    self.put_pointer(at, base, RelocationKind::ContentsPtr);
                    self.put(at + 4, &(count as u32).to_le_bytes());
                }
            }
            (FieldType::U16Array(capacity), Value::U16Array(values)) => {
                if values.len() > capacity {
                    return Err(mismatch().into());
                }
                for (i, v) in values.iter().enumerate() {
                    self.put(at + i * 2, &v.to_le_bytes());
                }
            }
            (FieldType::Indices, Value::Indices(indices)) => {
                if !indices.is_empty() {
                    let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
                    let target = self.push_raw_data(&bytes, INDEX_ALIGNMENT);
                    self.put_pointer(at, target, RelocationKind::RawDataIndex16);
                    self.put(at + 4, &(indices.len() as u32).to_le_bytes());
                }
            }
            (FieldType::Bytes, Value::Bytes(bytes)) => {
                if !bytes.is_empty() {
                    let target = self.push_raw_data(&bytes, RAW_DATA_ALIGNMENT);
                    self.put_pointer(at, target, RelocationKind::RawDataVertex);
                    self.put(at + 4, &(bytes.len() as u32).to_le_bytes());
                }
            }
            (FieldType::Commands, Value::Commands(blob)) => {
                if !blob.words.is_empty() {
                    let target = self.push_commands(kind, field, &blob)?;
                    self.put_pointer(at, target, RelocationKind::CommandPtr);
                    self.put(at + 4, &(blob.words.len() as u32).to_le_bytes());
                }
            }
            (FieldType::F32List, Value::F32List(values)) => {
                if !values.is_empty() {
                    let target = self.allocate(values.len() * 4);
                    self.put_floats(target, &values);
                    self.put_pointer(at, target, RelocationKind::ContentsPtr);
                    self.put(at + 4, &(values.len() as u32).to_le_bytes());
                }
            }
            _ => return Err(mismatch().into()),
        }
        Ok(())
    }

    fn push_commands(
        &mut self,
        kind: TypeKind,
        field: &FieldDef,
        blob: &CommandBlob,
    ) -> Result<usize, FormatError> {
        if let Some(&bad) = blob.raw_refs.iter().find(|&&i| i >= blob.words.len()) {
            log::error!("{kind:?}.{} raw reference {bad} is out of range", field.name);
            return Err(InternalError::FieldTypeMismatch {
                kind,
                field: field.name,
            }
            .into());
        }

        let commands = &mut self.sections.commands;
        commands.resize(commands.len().next_multiple_of(COMMAND_ALIGNMENT), 0);
        let base = commands.len();
        commands.extend(blob.words.iter().flat_map(|w| w.to_le_bytes()));

        for &word in &blob.raw_refs {
            self.sections
                .relocations
                .record(base + word * 4, RelocationKind::RawDataTexture);
        }
        Ok(base)
    }

    /// Reserves zeroed, word aligned space at the end of contents.
    fn allocate(&mut self, size: usize) -> usize {
        let contents = &mut self.sections.contents;
        let offset = contents.len().next_multiple_of(4);
        contents.resize(offset + size, 0);
        offset
    }

    /// Strings are stored NUL terminated, so an interior NUL is rejected.
    fn intern(&mut self, s: &str) -> Result<usize, FormatError> {
        if let Some(&offset) = self.string_offsets.get(s) {
            return Ok(offset as usize);
        }
        if s.contains('\0') {
            return Err(FormatError::InvalidName(s.to_string()));
        }
        let strings = &mut self.sections.strings;
        let offset = strings.len();
        strings.extend_from_slice(s.as_bytes());
        strings.push(0);
        self.string_offsets.insert(s.to_string(), offset as u32);
        Ok(offset)
    }

    fn put(&mut self, at: usize, bytes: &[u8]) {
        self.sections.contents[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn put_floats(&mut self, at: usize, values: &[f32]) {
        for (i, v) in values.iter().enumerate() {
            self.put(at + i * 4, &v.to_le_bytes());
        }
    }

    fn put_pointer(&mut self, at: usize, target: usize, kind: RelocationKind) {
        self.put(at, &(target as u32).to_le_bytes());
        self.sections.relocations.record(at, kind);
    }
}
