use super::{CommandBlob, FieldType, Layout, Record, TypeKind, TypeRegistry, Value};
use crate::format::FormatError;

/// Bounds-checked little-endian cursor over a whole container.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves the cursor. Seeking past the end is allowed; the next read fails.
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], FormatError> {
        let slice = self.slice_at(self.position, count)?;
        self.position += count;
        Ok(slice)
    }

    /// Reads `count` bytes at `offset` without moving the cursor.
    pub fn slice_at(&self, offset: usize, count: usize) -> Result<&'a [u8], FormatError> {
        offset
            .checked_add(count)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(FormatError::Truncated {
                offset,
                needed: count,
            })
    }

    pub fn skip(&mut self, count: usize) -> Result<(), FormatError> {
        self.read_bytes(count).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, FormatError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn read_floats<const N: usize>(&mut self) -> Result<[f32; N], FormatError> {
        let mut values = [0.0; N];
        for value in &mut values {
            *value = self.read_f32()?;
        }
        Ok(values)
    }

    /// Reads a NUL-terminated UTF-8 string at `offset`.
    pub fn string_at(&self, offset: usize) -> Result<String, FormatError> {
        let tail = self.bytes.get(offset..).ok_or(FormatError::Truncated {
            offset,
            needed: 1,
        })?;
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::InvalidString { offset })?;
        String::from_utf8(tail[..end].to_vec()).map_err(|_| FormatError::InvalidString { offset })
    }

    /// Reads `(pointer, count)` and returns the `count * element_size` bytes
    /// it refers to.
    fn read_block(&mut self, element_size: usize) -> Result<&'a [u8], FormatError> {
        let pointer = self.read_u32()? as usize;
        let count = self.read_u32()? as usize;
        if count == 0 {
            return Ok(&[]);
        }
        let length = count.checked_mul(element_size).ok_or(FormatError::Truncated {
            offset: pointer,
            needed: usize::MAX,
        })?;
        self.slice_at(pointer, length)
    }
}

/// Rebuilds records by following absolute pointers.
pub struct Deserializer<'a, 'r> {
    registry: &'r TypeRegistry,
    reader: BinaryReader<'a>,
}

impl<'a, 'r> Deserializer<'a, 'r> {
    pub fn new(registry: &'r TypeRegistry, bytes: &'a [u8]) -> Self {
        Self {
            registry,
            reader: BinaryReader::new(bytes),
        }
    }

    /// Reads the record of `kind` stored at `offset`.
    pub fn read_at(&mut self, kind: TypeKind, offset: usize) -> Result<Record, FormatError> {
        self.reader.seek(offset);
        self.read_record(kind)
    }

    fn read_record(&mut self, kind: TypeKind) -> Result<Record, FormatError> {
        let registry = self.registry;
        let def = registry.get(kind)?;
        let mut record = Record::new(kind);

        for field in &def.fields {
            let value = match field.ty {
                FieldType::Transient => continue,
                FieldType::Padding(count) => {
                    self.reader.skip(count)?;
                    continue;
                }
                FieldType::U8 => Value::U8(self.reader.read_u8()?),
                FieldType::U16 => Value::U16(self.reader.read_u16()?),
                FieldType::I16 => Value::I16(self.reader.read_i16()?),
                FieldType::U32 => Value::U32(self.reader.read_u32()?),
                FieldType::F32 => Value::F32(self.reader.read_f32()?),
                FieldType::Vector3 => Value::Vector3(self.reader.read_floats()?),
                FieldType::Matrix3x4 => Value::Matrix3x4([
                    self.reader.read_floats()?,
                    self.reader.read_floats()?,
                    self.reader.read_floats()?,
                ]),
                FieldType::String => match self.reader.read_u32()? {
                    0 => Value::String(None),
                    pointer => Value::String(Some(self.reader.string_at(pointer as usize)?)),
                },
                FieldType::List(element) => {
                    let pointer = self.reader.read_u32()? as usize;
                    let count = self.reader.read_u32()? as usize;
                    let resume = self.reader.position();

                    let mut records = Vec::new();
                    if count > 0 {
                        self.reader.seek(pointer);
                        for _ in 0..count {
                            records.push(self.read_record(element)?);
                        }
                        self.reader.seek(resume);
                    }
                    record.set(field.name, Value::List(records));
                    continue;
                }
                FieldType::U16Array(count) => {
                    let mut values = Vec::with_capacity(count);
                    for _ in 0..count {
                        values.push(self.reader.read_u16()?);
                    }
                    Value::U16Array(values)
                }
                FieldType::Indices => Value::Indices(
                    self.reader
                        .read_block(2)?
                        .chunks_exact(2)
                        .map(|b| u16::from_le_bytes([b[0], b[1]]))
                        .collect(),
                ),
                FieldType::Bytes => Value::Bytes(self.reader.read_block(1)?.to_vec()),
                FieldType::Commands => Value::Commands(CommandBlob {
                    words: self.reader
                        .read_block(4)?
                        .chunks_exact(4)
                        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect(),
                    raw_refs: Vec::new(),
                }),
                FieldType::F32List => Value::F32List(
                    self.reader
                        .read_block(4)?
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect(),
                ),
            };
            record.set(field.name, value);
        }

        if let Layout::Custom(hook) = &def.layout {
            hook.deserialize(&mut record, &mut self.reader)?;
        }
        Ok(record)
    }
}
