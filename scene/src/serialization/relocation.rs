//! Deferred pointer patching.
//!
//! While serializing, every pointer is written as an offset relative to the
//! start of its target section and recorded here. Once the container layout
//! is known, [`RelocationTable::apply`] adds each target section's absolute
//! address.

use std::collections::HashSet;

use crate::format::InternalError;

/// Container sections, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Contents,
    Strings,
    Commands,
    RawData,
    Relocations,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocationKind {
    ContentsPtr = 0,
    StringPtr = 1,
    CommandPtr = 2,
    RawDataVertex = 3,
    RawDataIndex16 = 4,
    /// Texture address word inside a command stream.
    RawDataTexture = 5,
}

impl RelocationKind {
    /// Section holding the pointer.
    pub fn host(self) -> Section {
        match self {
            Self::RawDataTexture => Section::Commands,
            _ => Section::Contents,
        }
    }

    /// Section the pointer points into.
    pub fn target(self) -> Section {
        match self {
            Self::ContentsPtr => Section::Contents,
            Self::StringPtr => Section::Strings,
            Self::CommandPtr => Section::Commands,
            Self::RawDataVertex | Self::RawDataIndex16 | Self::RawDataTexture => Section::RawData,
        }
    }
}

impl TryFrom<u8> for RelocationKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0 => Self::ContentsPtr,
            1 => Self::StringPtr,
            2 => Self::CommandPtr,
            3 => Self::RawDataVertex,
            4 => Self::RawDataIndex16,
            5 => Self::RawDataTexture,
            other => return Err(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    /// Byte offset of the pointer inside its host section.
    pub offset: u32,
    pub kind: RelocationKind,
}

/// Offsets are stored in words, in the low 25 bits.
const OFFSET_BITS: u32 = 25;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationTable {
    entries: Vec<RelocationEntry>,
}

impl RelocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, offset: usize, kind: RelocationKind) {
        self.entries.push(RelocationEntry {
            offset: offset as u32,
            kind,
        });
    }

    pub fn entries(&self) -> &[RelocationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patches every recorded pointer exactly once.
    ///
    /// `resolve` returns the absolute address of a section. Returns the number
    /// of patched pointers, which always equals [`len`](Self::len) on success.
    pub fn apply(
        &self,
        contents: &mut [u8],
        commands: &mut [u8],
        resolve: impl Fn(Section) -> Option<u32>,
    ) -> Result<usize, InternalError> {
        let mut patched = HashSet::with_capacity(self.entries.len());

        for entry in &self.entries {
            let section = entry.kind.host();
            let offset = entry.offset as usize;
            let host: &mut [u8] = match section {
                Section::Commands => &mut *commands,
                _ => &mut *contents,
            };

            if offset % 4 != 0 {
                return Err(InternalError::MisalignedRelocation { offset });
            }
            let Some(slot) = host.get_mut(offset..offset + 4) else {
                return Err(InternalError::UnresolvedRelocation { section, offset });
            };
            if !patched.insert((section, offset)) {
                return Err(InternalError::DuplicateRelocation { section, offset });
            }
            let base = resolve(entry.kind.target())
                .ok_or(InternalError::UnresolvedRelocation { section, offset })?;

            let delta = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            let address = delta.checked_add(base).ok_or(InternalError::SectionTooLarge)?;
            slot.copy_from_slice(&address.to_le_bytes());
        }

        log::debug!("Patched {} relocations", patched.len());
        Ok(patched.len())
    }

    /// Encodes entries as `(offset >> 2) | kind << 25`.
    pub fn to_words(&self) -> Result<Vec<u32>, InternalError> {
        self.entries
            .iter()
            .map(|entry| {
                let word_offset = entry.offset >> 2;
                if word_offset >> OFFSET_BITS != 0 {
                    return Err(InternalError::SectionTooLarge);
                }
                Ok(word_offset | (entry.kind as u32) << OFFSET_BITS)
            })
            .collect()
    }

    /// Decodes a stored table. Fails with the unknown kind value.
    pub fn from_words(words: &[u32]) -> Result<Self, u8> {
        let entries = words
            .iter()
            .map(|word| {
                let kind = RelocationKind::try_from((word >> OFFSET_BITS) as u8)?;
                Ok(RelocationEntry {
                    offset: (word & ((1 << OFFSET_BITS) - 1)) << 2,
                    kind,
                })
            })
            .collect::<Result<Vec<_>, u8>>()?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(section: Section) -> Option<u32> {
        match section {
            Section::Contents => Some(0x100),
            Section::Strings => Some(0x200),
            Section::Commands => Some(0x300),
            Section::RawData => Some(0x1000),
            Section::Relocations => None,
        }
    }

    #[test]
    fn test_apply_adds_target_base() {
        let mut contents = vec![0u8; 16];
        contents[4..8].copy_from_slice(&8u32.to_le_bytes());
        let mut commands = vec![0u8; 8];
        commands[0..4].copy_from_slice(&0x80u32.to_le_bytes());

        let mut table = RelocationTable::new();
        table.record(4, RelocationKind::StringPtr);
        table.record(0, RelocationKind::RawDataTexture);

        let count = table.apply(&mut contents, &mut commands, resolve).unwrap();
        assert_eq!(count, table.len());
        assert_eq!(u32::from_le_bytes(contents[4..8].try_into().unwrap()), 0x208);
        assert_eq!(u32::from_le_bytes(commands[0..4].try_into().unwrap()), 0x1080);
    }

    #[test]
    fn test_duplicate_entry_is_rejected() {
        let mut contents = vec![0u8; 8];
        let mut table = RelocationTable::new();
        table.record(0, RelocationKind::ContentsPtr);
        table.record(0, RelocationKind::ContentsPtr);

        let result = table.apply(&mut contents, &mut [], resolve);
        assert!(matches!(
            result,
            Err(InternalError::DuplicateRelocation { offset: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_range_entry_is_unresolved() {
        let mut table = RelocationTable::new();
        table.record(8, RelocationKind::ContentsPtr);

        let result = table.apply(&mut [0u8; 8], &mut [], resolve);
        assert!(matches!(
            result,
            Err(InternalError::UnresolvedRelocation { offset: 8, .. })
        ));
    }

    #[test]
    fn test_misaligned_entry() {
        let mut table = RelocationTable::new();
        table.record(2, RelocationKind::ContentsPtr);
        let result = table.apply(&mut [0u8; 8], &mut [], resolve);
        assert!(matches!(result, Err(InternalError::MisalignedRelocation { offset: 2 })));
    }

    #[test]
    fn test_word_encoding() {
        let mut table = RelocationTable::new();
        table.record(0x40, RelocationKind::RawDataIndex16);
        table.record(0x8, RelocationKind::RawDataTexture);

        let words = table.to_words().unwrap();
        assert_eq!(words[0], 0x10 | 4 << 25);
        assert_eq!(RelocationTable::from_words(&words).unwrap(), table);
        assert_eq!(RelocationTable::from_words(&[7 << 25]), Err(7));
    }
}
