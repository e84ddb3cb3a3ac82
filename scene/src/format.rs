//! H3D container serialization.
//!
//! This module reads and writes scenes in the binary container format (.bch)
//! consumed by the handheld GPU runtime. The file is a fixed header followed
//! by five sections; all pointers stored in the file are absolute once the
//! relocation pass has run.
//!
//! # File Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ FIXED HEADER (0x34 bytes)                                    │
//! │  [0x00..0x04]  Magic: b"BCH\0"                               │
//! │  [0x04]        Backward compatibility: u8                    │
//! │  [0x05]        Forward compatibility: u8                     │
//! │  [0x06..0x08]  Converter version: u16                        │
//! │  [0x08..0x1C]  Section addresses: 5 x u32                    │
//! │  [0x1C..0x30]  Section lengths: 5 x u32                      │
//! │  [0x30..0x32]  Flags: u16                                    │
//! │  [0x32..0x34]  Relocation count: u16 (saturating)            │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CONTENTS     entity records, root at offset 0                │
//! │ STRINGS      NUL-terminated names, deduplicated              │
//! │ COMMANDS     GPU command streams (texture unit state)        │
//! │ RAW DATA     vertex buffers, index buffers, texture texels   │
//! │ RELOCATIONS  (offset >> 2) | kind << 25, one word per entry  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every section starts on a 0x80 byte boundary. Multi-byte values are
//! little-endian.

use std::io::Write;

use thiserror::Error;

use crate::pica::CodecError;
use crate::serialization::{
    BinaryReader, Deserializer, Record, Reflect, RelocationTable, Section, Serializer, TypeKind,
    TypeRegistry,
};
use crate::Scene;

// ============================================================================
// Constants
// ============================================================================

/// Magic number identifying container files: "BCH\0" in ASCII
pub const MAGIC: [u8; 4] = *b"BCH\0";

/// Compatibility revision written to both compatibility bytes
pub const VERSION: u8 = 0x21;

/// Converter revision stamped into the header
pub const CONVERTER_VERSION: u16 = 42607;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 0x34;

/// Every section starts on this boundary
pub const SECTION_ALIGNMENT: usize = 0x80;

const SECTION_ORDER: [Section; 5] = [
    Section::Contents,
    Section::Strings,
    Section::Commands,
    Section::RawData,
    Section::Relocations,
];

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during container serialization/deserialization.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Invalid magic number")]
    InvalidMagic,

    #[error("Unsupported version: 0x{0:02X}")]
    UnsupportedVersion(u8),

    #[error("Unexpected end of data at offset 0x{offset:X} ({needed} bytes needed)")]
    Truncated { offset: usize, needed: usize },

    #[error("Invalid string at offset 0x{offset:X}")]
    InvalidString { offset: usize },

    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: u32 },

    #[error("Name {0:?} contains a NUL byte")]
    InvalidName(String),

    #[error("Texture face index {0} is outside 0-5")]
    FaceIndexOutOfRange(usize),

    #[error("Texture face {0} has no data")]
    MissingFace(usize),

    #[error("Textures need 1 or 6 faces, got {0}")]
    InvalidFaceCount(usize),

    #[error("Texture {name}: face holds {actual} bytes, expected {expected}")]
    TextureSizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Texture dimensions {width}x{height} exceed 2047")]
    TextureTooLarge { width: u32, height: u32 },

    #[error("Texture load error: {0}")]
    TextureError(String),

    #[error("Sub-mesh references {count} bones, limit is {limit}")]
    TooManyBones { count: usize, limit: usize },

    #[error("Index {index} out of range for {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),
}

/// Container construction bugs. These are never caused by input data.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("Type {0:?} is not registered")]
    UnregisteredType(TypeKind),

    #[error("{kind:?} record has no field {field}")]
    MissingField { kind: TypeKind, field: &'static str },

    #[error("{kind:?}.{field} holds a value of the wrong type")]
    FieldTypeMismatch { kind: TypeKind, field: &'static str },

    #[error("Relocation at {section:?}+0x{offset:X} was not resolved")]
    UnresolvedRelocation { section: Section, offset: usize },

    #[error("Relocation at {section:?}+0x{offset:X} recorded twice")]
    DuplicateRelocation { section: Section, offset: usize },

    #[error("Relocation offset 0x{offset:X} is not word aligned")]
    MisalignedRelocation { offset: usize },

    #[error("Section exceeds addressable size")]
    SectionTooLarge,
}

// ============================================================================
// File Header
// ============================================================================

/// Address and length of one section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionEntry {
    pub address: u32,
    pub length: u32,
}

/// Fixed-size file header at the start of every container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub backward_compat: u8,
    pub forward_compat: u8,
    pub converter_version: u16,
    /// Indexed in file order: contents, strings, commands, raw data, relocations
    pub sections: [SectionEntry; 5],
    pub flags: u16,
    pub address_count: u16,
}

impl FileHeader {
    pub fn new(sections: [SectionEntry; 5], address_count: usize) -> Self {
        Self {
            backward_compat: VERSION,
            forward_compat: VERSION,
            converter_version: CONVERTER_VERSION,
            sections,
            flags: 0,
            address_count: address_count.min(u16::MAX as usize) as u16,
        }
    }

    pub fn section(&self, section: Section) -> SectionEntry {
        let index = SECTION_ORDER
            .iter()
            .position(|s| *s == section)
            .unwrap_or(0);
        self.sections[index]
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), FormatError> {
        writer.write_all(&MAGIC)?;
        writer.write_all(&[self.backward_compat, self.forward_compat])?;
        writer.write_all(&self.converter_version.to_le_bytes())?;
        for entry in &self.sections {
            writer.write_all(&entry.address.to_le_bytes())?;
        }
        for entry in &self.sections {
            writer.write_all(&entry.length.to_le_bytes())?;
        }
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.address_count.to_le_bytes())?;
        Ok(())
    }

    pub fn read(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError> {
        if reader.read_bytes(4)? != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let backward_compat = reader.read_u8()?;
        let forward_compat = reader.read_u8()?;
        if backward_compat > VERSION {
            return Err(FormatError::UnsupportedVersion(backward_compat));
        }
        let converter_version = reader.read_u16()?;

        let mut sections = [SectionEntry::default(); 5];
        for entry in &mut sections {
            entry.address = reader.read_u32()?;
        }
        for entry in &mut sections {
            entry.length = reader.read_u32()?;
        }

        Ok(Self {
            backward_compat,
            forward_compat,
            converter_version,
            sections,
            flags: reader.read_u16()?,
            address_count: reader.read_u16()?,
        })
    }
}

// ============================================================================
// Phased Deserialization
// ============================================================================

/// A container parsed down to its root record, before entity conversion.
/// Produced by [`parse_h3d`].
pub struct ParsedContainer {
    pub header: FileHeader,
    pub relocations: RelocationTable,
    pub contents: Record,
}

/// Phase 1: header, relocation table and the raw record graph.
pub fn parse_h3d(bytes: &[u8]) -> Result<ParsedContainer, FormatError> {
    let mut reader = BinaryReader::new(bytes);
    let header = FileHeader::read(&mut reader)?;

    let table = header.section(Section::Relocations);
    let words: Vec<u32> = reader
        .slice_at(table.address as usize, table.length as usize)?
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let relocations = RelocationTable::from_words(&words).map_err(|kind| {
        FormatError::InvalidValue {
            what: "relocation kind",
            value: kind as u32,
        }
    })?;

    let registry = TypeRegistry::h3d();
    let contents = Deserializer::new(&registry, bytes)
        .read_at(TypeKind::Contents, header.section(Section::Contents).address as usize)?;

    Ok(ParsedContainer {
        header,
        relocations,
        contents,
    })
}

// ============================================================================
// Scene Serialization Methods
// ============================================================================

impl Scene {
    /// Serializes the scene to container bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FormatError> {
        let registry = TypeRegistry::h3d();
        let mut sections = Serializer::new(&registry).serialize(self.to_record()?)?;
        let relocation_words = sections.relocations.to_words()?;

        let lengths = [
            sections.contents.len(),
            sections.strings.len(),
            sections.commands.len(),
            sections.raw_data.len(),
            relocation_words.len() * 4,
        ];
        let mut entries = [SectionEntry::default(); 5];
        let mut cursor = HEADER_SIZE;
        for (entry, length) in entries.iter_mut().zip(lengths) {
            cursor = cursor.next_multiple_of(SECTION_ALIGNMENT);
            *entry = SectionEntry {
                address: u32::try_from(cursor).map_err(|_| InternalError::SectionTooLarge)?,
                length: u32::try_from(length).map_err(|_| InternalError::SectionTooLarge)?,
            };
            cursor += length;
        }
        u32::try_from(cursor).map_err(|_| InternalError::SectionTooLarge)?;

        let header = FileHeader::new(entries, sections.relocations.len());
        sections.relocations.apply(
            &mut sections.contents,
            &mut sections.commands,
            |section| Some(header.section(section).address),
        )?;

        let mut output = Vec::with_capacity(cursor);
        header.write(&mut output)?;
        let relocation_bytes: Vec<u8> = relocation_words
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        let payloads = [
            &sections.contents,
            &sections.strings,
            &sections.commands,
            &sections.raw_data,
            &relocation_bytes,
        ];
        for (entry, payload) in entries.iter().zip(payloads) {
            output.resize(entry.address as usize, 0);
            output.extend_from_slice(payload);
        }

        Ok(output)
    }

    /// Deserializes a scene from container bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Scene, FormatError> {
        let parsed = parse_h3d(bytes)?;
        Scene::from_record(parsed.contents)
    }

    /// Saves the scene to a file.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), FormatError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Loads a scene from a file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Scene, FormatError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scene_round_trip() {
        let scene = Scene::new();
        let bytes = scene.to_bytes().expect("Failed to serialize empty scene");
        let loaded = Scene::from_bytes(&bytes).expect("Failed to deserialize empty scene");
        assert_eq!(loaded, scene);
    }

    #[test]
    fn test_header_layout() {
        let bytes = Scene::new().to_bytes().expect("Failed to serialize");

        assert_eq!(&bytes[0..4], b"BCH\0");
        assert_eq!(bytes[4], VERSION);

        let mut reader = BinaryReader::new(&bytes);
        let header = FileHeader::read(&mut reader).unwrap();
        assert_eq!(reader.position(), HEADER_SIZE);
        for entry in &header.sections {
            assert_eq!(entry.address as usize % SECTION_ALIGNMENT, 0);
        }
        assert_eq!(header.section(Section::Contents).address, 0x80);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut bytes = vec![b'X', b'X', b'X', b'X'];
        bytes.extend([0u8; HEADER_SIZE - 4]);

        let result = Scene::from_bytes(&bytes);
        assert!(matches!(result, Err(FormatError::InvalidMagic)));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = Scene::new().to_bytes().unwrap();
        bytes[4] = VERSION + 1;
        assert!(matches!(
            Scene::from_bytes(&bytes),
            Err(FormatError::UnsupportedVersion(v)) if v == VERSION + 1
        ));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = Scene::new().to_bytes().unwrap();
        let result = Scene::from_bytes(&bytes[..0x20]);
        assert!(matches!(result, Err(FormatError::Truncated { offset: 0x20, .. })));
    }
}
