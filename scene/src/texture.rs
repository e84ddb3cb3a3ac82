use std::path::Path;

use crate::format::{FormatError, InternalError};
use crate::pica::commands::expand;
use crate::pica::{
    buffer_length, mip_chain_length, parameter_index, CommandReader, CommandWriter, PicaRegister,
    TextureCodec, TextureFormat,
};
use crate::serialization::{
    field, name_value, BinaryReader, CommandBlob, CustomLayout, FieldType, Record, Reflect,
    Serializer, TypeDef, TypeKind, Value, RAW_DATA_ALIGNMENT,
};

/// Faces of a cube map, in address register order: +X, -X, +Y, -Y, +Z, -Z.
pub const CUBE_FACES: usize = 6;

/// Widest and tallest texture the DIM register can describe.
pub const MAX_DIMENSION: u32 = 0x7FF;

/// Most mip levels an 11-bit dimension can halve through.
pub const MAX_MIP_LEVELS: u8 = 11;

fn check_mip_levels(mipmap_size: u8) -> Result<u8, FormatError> {
    if mipmap_size > MAX_MIP_LEVELS {
        return Err(FormatError::InvalidValue {
            what: "mipmap size",
            value: mipmap_size as u32,
        });
    }
    Ok(mipmap_size.max(1))
}

/// A 2D texture or cube map holding native (tiled, encoded) pixel data.
///
/// Width, height, format and the face payloads are authoritative. The GPU
/// command streams stored in the container are rebuilt from them on every
/// save.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub mipmap_size: u8,
    faces: Vec<Vec<u8>>,
}

impl Texture {
    /// Creates a texture from encoded faces. `faces` holds one entry for a 2D
    /// texture or six for a cube map, each a full mip chain.
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        format: TextureFormat,
        mipmap_size: u8,
        faces: Vec<Vec<u8>>,
    ) -> Result<Self, FormatError> {
        if faces.len() != 1 && faces.len() != CUBE_FACES {
            return Err(FormatError::InvalidFaceCount(faces.len()));
        }

        let texture = Self {
            name: name.into(),
            format,
            width,
            height,
            mipmap_size: check_mip_levels(mipmap_size)?,
            faces: Vec::new(),
        };
        let expected = texture.face_length();
        if let Some(face) = faces.iter().find(|face| face.len() != expected) {
            return Err(FormatError::TextureSizeMismatch {
                name: texture.name,
                expected,
                actual: face.len(),
            });
        }

        Ok(Self { faces, ..texture })
    }

    /// Encodes a top-down RGBA8 image as a single-level 2D texture.
    pub fn from_rgba(
        name: impl Into<String>,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: TextureFormat,
        codec: &dyn TextureCodec,
    ) -> Result<Self, FormatError> {
        let data = codec.encode(rgba, width, height, format)?;
        Self::new(name, width, height, format, 1, vec![data])
    }

    /// Loads a bitmap through the image codec. The texture is named after the
    /// file stem.
    pub fn from_image_file(
        path: impl AsRef<Path>,
        format: TextureFormat,
        codec: &dyn TextureCodec,
    ) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let image = image::open(path)
            .map_err(|e| FormatError::TextureError(format!("{}: {e}", path.display())))?
            .to_rgba8();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self::from_rgba(name, image.as_raw(), image.width(), image.height(), format, codec)
    }

    /// Bytes of one face, all mip levels included.
    pub fn face_length(&self) -> usize {
        mip_chain_length(self.width, self.height, self.mipmap_size, self.format)
    }

    pub fn is_cube(&self) -> bool {
        self.faces.len() == CUBE_FACES
    }

    pub fn faces(&self) -> &[Vec<u8>] {
        &self.faces
    }

    /// Encoded data of `face`. Indices past 5 are always an error; indices
    /// past the last face of a 2D texture report the face as missing.
    pub fn face(&self, face: usize) -> Result<&[u8], FormatError> {
        if face >= CUBE_FACES {
            return Err(FormatError::FaceIndexOutOfRange(face));
        }
        self.faces
            .get(face)
            .map(Vec::as_slice)
            .ok_or(FormatError::MissingFace(face))
    }

    /// Overwrites the encoded data of an existing face.
    pub fn replace_face(&mut self, face: usize, data: Vec<u8>) -> Result<(), FormatError> {
        self.face(face)?;
        let expected = self.face_length();
        if data.len() != expected {
            return Err(FormatError::TextureSizeMismatch {
                name: self.name.clone(),
                expected,
                actual: data.len(),
            });
        }
        self.faces[face] = data;
        Ok(())
    }

    /// Takes format, size and every face from `other`, keeping the name.
    pub fn replace_data(&mut self, other: &Texture) {
        self.format = other.format;
        self.width = other.width;
        self.height = other.height;
        self.mipmap_size = other.mipmap_size;
        self.faces = other.faces.clone();
    }

    /// Decodes the base level of `face` to top-down RGBA8.
    pub fn to_rgba(&self, face: usize, codec: &dyn TextureCodec) -> Result<Vec<u8>, FormatError> {
        let data = self.face(face)?;
        let base = buffer_length(self.width, self.height, self.format).min(data.len());
        Ok(codec.decode(&data[..base], self.width, self.height, self.format)?)
    }

    pub fn save_png(
        &self,
        face: usize,
        path: impl AsRef<Path>,
        codec: &dyn TextureCodec,
    ) -> Result<(), FormatError> {
        let rgba = self.to_rgba(face, codec)?;
        let image = image::RgbaImage::from_raw(self.width, self.height, rgba).ok_or_else(|| {
            FormatError::TextureError(format!("{}: decoded buffer has the wrong size", self.name))
        })?;
        image
            .save_with_format(path.as_ref(), image::ImageFormat::Png)
            .map_err(|e| FormatError::TextureError(e.to_string()))
    }
}

// ============================================================================
// Wire layout
// ============================================================================

/// Emits the three texture unit command streams in place of the pixel
/// fields, and reads the faces back from the unit 0 addresses.
struct TextureLayout;

/// Registers of one texture unit.
struct UnitRegisters {
    dim: PicaRegister,
    lod: PicaRegister,
    addresses: &'static [PicaRegister],
    format: PicaRegister,
}

const UNITS: [UnitRegisters; 3] = [
    UnitRegisters {
        dim: PicaRegister::TEXUNIT0_DIM,
        lod: PicaRegister::TEXUNIT0_LOD,
        addresses: &PicaRegister::TEXUNIT0_FACE_ADDRS,
        format: PicaRegister::TEXUNIT0_TYPE,
    },
    UnitRegisters {
        dim: PicaRegister::TEXUNIT1_DIM,
        lod: PicaRegister::TEXUNIT1_LOD,
        addresses: &[PicaRegister::TEXUNIT1_ADDR],
        format: PicaRegister::TEXUNIT1_TYPE,
    },
    UnitRegisters {
        dim: PicaRegister::TEXUNIT2_DIM,
        lod: PicaRegister::TEXUNIT2_LOD,
        addresses: &[PicaRegister::TEXUNIT2_ADDR],
        format: PicaRegister::TEXUNIT2_TYPE,
    },
];

const COMMAND_FIELDS: [&str; 3] = ["commands0", "commands1", "commands2"];

fn peek_u32(record: &Record, field: &'static str) -> Result<u32, InternalError> {
    match record.get(field) {
        Some(Value::U32(value)) => Ok(*value),
        Some(_) => Err(InternalError::FieldTypeMismatch {
            kind: record.kind,
            field,
        }),
        None => Err(InternalError::MissingField {
            kind: record.kind,
            field,
        }),
    }
}

/// Builds one unit's stream. Only unit 0 receives live face addresses;
/// units 1 and 2 always carry a zero address.
fn unit_commands(
    unit: &UnitRegisters,
    dim: u32,
    lod: u32,
    format: u32,
    face_offsets: Option<&[usize]>,
) -> CommandBlob {
    let mut writer = CommandWriter::new();
    writer.set_command(unit.dim, dim);
    writer.set_command(unit.lod, lod);

    let live: Vec<PicaRegister> = match face_offsets {
        Some(offsets) => {
            for (register, offset) in unit.addresses.iter().zip(offsets) {
                writer.set_command(*register, *offset as u32);
            }
            unit.addresses.iter().take(offsets.len()).copied().collect()
        }
        None => {
            writer.set_command(unit.addresses[0], 0);
            Vec::new()
        }
    };

    writer.set_command(unit.format, format);
    writer.write_end();
    let words = writer.get_buffer();

    let raw_refs = live
        .into_iter()
        .filter_map(|register| parameter_index(&words, register))
        .collect();
    CommandBlob { words, raw_refs }
}

impl CustomLayout for TextureLayout {
    fn serialize(
        &self,
        record: &mut Record,
        serializer: &mut Serializer<'_>,
        _offset: usize,
    ) -> Result<bool, FormatError> {
        let width = record.take_u32("width")?;
        let height = record.take_u32("height")?;
        let faces = record.take_faces("faces")?;
        let format = peek_u32(record, "format")?;
        let mipmap_size = match record.get("mipmap_size") {
            Some(Value::U8(value)) => check_mip_levels(*value)? as u32,
            _ => 1,
        };

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(FormatError::TextureTooLarge { width, height });
        }
        if faces.len() != 1 && faces.len() != CUBE_FACES {
            return Err(FormatError::InvalidFaceCount(faces.len()));
        }

        let offsets: Vec<usize> = faces
            .iter()
            .map(|face| serializer.push_raw_data(face, RAW_DATA_ALIGNMENT))
            .collect();

        let dim = height | width << 16;
        for (unit, (registers, name)) in UNITS.iter().zip(COMMAND_FIELDS).enumerate() {
            let live = (unit == 0).then_some(offsets.as_slice());
            let blob = unit_commands(registers, dim, mipmap_size, format, live);
            record.set(name, Value::Commands(blob));
        }

        // Command fields are now filled in; the default layout writes them.
        Ok(false)
    }

    fn deserialize(
        &self,
        record: &mut Record,
        reader: &mut BinaryReader<'_>,
    ) -> Result<(), FormatError> {
        let words = match record.get("commands0") {
            Some(Value::Commands(blob)) => blob.words.clone(),
            _ => Vec::new(),
        };

        let mut width = 0;
        let mut height = 0;
        let mut addresses = [0u32; CUBE_FACES];
        for command in CommandReader::new(&words) {
            for (register, value) in expand(&command) {
                match register {
                    PicaRegister::TEXUNIT0_DIM => {
                        height = value & MAX_DIMENSION;
                        width = (value >> 16) & MAX_DIMENSION;
                    }
                    _ => match PicaRegister::TEXUNIT0_FACE_ADDRS
                        .iter()
                        .position(|r| *r == register)
                    {
                        Some(face) => addresses[face] = value,
                        None => log::trace!("Ignoring texture register {:#05x}", register.0),
                    },
                }
            }
        }

        let format = TextureFormat::try_from(peek_u32(record, "format")?)?;
        let mipmap_size = match record.get("mipmap_size") {
            Some(Value::U8(value)) => check_mip_levels(*value)?,
            _ => 1,
        };
        let length = mip_chain_length(width, height, mipmap_size, format);

        let face_count = if addresses[1..].iter().any(|&a| a != 0) {
            CUBE_FACES
        } else {
            1
        };
        let mut faces = Vec::with_capacity(face_count);
        for (face, &address) in addresses.iter().take(face_count).enumerate() {
            if address == 0 {
                return Err(FormatError::MissingFace(face));
            }
            // The cursor stays where the record ended.
            faces.push(reader.slice_at(address as usize, length)?.to_vec());
        }

        record.set("width", Value::U32(width));
        record.set("height", Value::U32(height));
        record.set("faces", Value::Faces(faces));
        Ok(())
    }
}

impl Reflect for Texture {
    const KIND: TypeKind = TypeKind::Texture;

    fn type_def() -> TypeDef {
        TypeDef::new(
            Self::KIND,
            vec![
                field("commands0", FieldType::Commands),
                field("commands1", FieldType::Commands),
                field("commands2", FieldType::Commands),
                field("format", FieldType::U32),
                field("mipmap_size", FieldType::U8),
                field("_pad", FieldType::Padding(3)),
                field("name", FieldType::String),
                field("width", FieldType::Transient),
                field("height", FieldType::Transient),
                field("faces", FieldType::Transient),
            ],
        )
        .with_layout(TextureLayout)
    }

    fn to_record(&self) -> Result<Record, FormatError> {
        Ok(Record::new(Self::KIND)
            .with("format", Value::U32(self.format as u32))
            .with("mipmap_size", Value::U8(self.mipmap_size))
            .with("name", name_value(&self.name))
            .with("width", Value::U32(self.width))
            .with("height", Value::U32(self.height))
            .with("faces", Value::Faces(self.faces.clone())))
    }

    fn from_record(mut record: Record) -> Result<Self, FormatError> {
        let format = TextureFormat::try_from(record.take_u32("format")?)?;
        Self::new(
            record.take_name("name")?,
            record.take_u32("width")?,
            record.take_u32("height")?,
            format,
            record.take_u8("mipmap_size")?,
            record.take_faces("faces")?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pica::PicaCodec;

    fn checker(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let on = (i % width + i / width) % 2 == 0;
                if on {
                    [255, 255, 255, 255]
                } else {
                    [0, 0, 0, 255]
                }
            })
            .collect()
    }

    #[test]
    fn test_face_index_out_of_range() {
        let texture = Texture::new("t", 8, 8, TextureFormat::L8, 1, vec![vec![0; 64]]).unwrap();
        assert!(matches!(texture.face(6), Err(FormatError::FaceIndexOutOfRange(6))));
        assert!(matches!(texture.face(1), Err(FormatError::MissingFace(1))));
        assert_eq!(texture.face(0).unwrap().len(), 64);
    }

    #[test]
    fn test_face_count_validated() {
        let faces = vec![vec![0; 64]; 2];
        assert!(matches!(
            Texture::new("t", 8, 8, TextureFormat::L8, 1, faces),
            Err(FormatError::InvalidFaceCount(2))
        ));
    }

    #[test]
    fn test_face_length_validated() {
        let result = Texture::new("t", 8, 8, TextureFormat::Rgba8, 1, vec![vec![0; 64]]);
        assert!(matches!(
            result,
            Err(FormatError::TextureSizeMismatch { expected: 256, actual: 64, .. })
        ));
    }

    #[test]
    fn test_mip_levels_validated() {
        let faces = vec![vec![0; 40 * 64]];
        assert!(matches!(
            Texture::new("t", 8, 8, TextureFormat::L8, 40, faces),
            Err(FormatError::InvalidValue { what: "mipmap size", value: 40 })
        ));
        let faces = vec![vec![0; 11 * 64]];
        assert!(Texture::new("t", 8, 8, TextureFormat::L8, MAX_MIP_LEVELS, faces).is_ok());
    }

    #[test]
    fn test_rgba_round_trip() {
        let rgba = checker(16, 8);
        let texture =
            Texture::from_rgba("c", &rgba, 16, 8, TextureFormat::Rgba8, &PicaCodec).unwrap();
        assert_eq!(texture.face_length(), 16 * 8 * 4);
        assert_eq!(texture.to_rgba(0, &PicaCodec).unwrap(), rgba);
    }

    #[test]
    fn test_replace_face_checks_length() {
        let mut texture =
            Texture::new("t", 8, 8, TextureFormat::A8, 1, vec![vec![0; 64]; CUBE_FACES]).unwrap();
        assert!(texture.is_cube());
        texture.replace_face(5, vec![7; 64]).unwrap();
        assert_eq!(texture.face(5).unwrap()[0], 7);
        assert!(matches!(
            texture.replace_face(2, vec![0; 3]),
            Err(FormatError::TextureSizeMismatch { .. })
        ));
    }

    #[test]
    fn test_replace_data_keeps_name() {
        let mut texture =
            Texture::new("hair", 8, 8, TextureFormat::L8, 1, vec![vec![0; 64]]).unwrap();
        let cube =
            Texture::new("sky", 16, 16, TextureFormat::A8, 1, vec![vec![9; 256]; CUBE_FACES])
                .unwrap();
        texture.replace_data(&cube);

        assert_eq!(texture.name, "hair");
        assert_eq!((texture.width, texture.height, texture.format), (16, 16, TextureFormat::A8));
        assert!(texture.is_cube());
        assert_eq!(texture.faces(), cube.faces());
    }

    #[test]
    fn test_unit_zero_relocates_every_face() {
        let offsets = [0x80, 0x100, 0x180, 0x200, 0x280, 0x300];
        let blob = unit_commands(&UNITS[0], 8 | 8 << 16, 1, 0, Some(&offsets[..]));
        assert_eq!(blob.raw_refs.len(), CUBE_FACES);
        for (index, offset) in blob.raw_refs.iter().zip(offsets) {
            assert_eq!(blob.words[*index], offset as u32);
        }
    }

    #[test]
    fn test_units_one_and_two_have_zero_address() {
        for unit in &UNITS[1..] {
            let blob = unit_commands(unit, 8 | 8 << 16, 1, 0, None);
            assert!(blob.raw_refs.is_empty());
            let address = CommandReader::new(&blob.words)
                .find_map(|command| command.value_for(unit.addresses[0]));
            assert_eq!(address, Some(0));
        }
    }

    #[test]
    fn test_png_round_trip() {
        let dir = std::env::temp_dir().join(format!("h3d_texture_png_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("checker.png");

        let rgba = checker(8, 8);
        let texture =
            Texture::from_rgba("checker", &rgba, 8, 8, TextureFormat::Rgba8, &PicaCodec).unwrap();
        texture.save_png(0, &path, &PicaCodec).unwrap();

        let loaded = Texture::from_image_file(&path, TextureFormat::Rgba8, &PicaCodec).unwrap();
        assert_eq!(loaded.name, "checker");
        assert_eq!(loaded.face(0).unwrap(), texture.face(0).unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
