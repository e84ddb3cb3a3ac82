use super::*;
use crate::format::{HEADER_SIZE, SECTION_ALIGNMENT};
use crate::import_export::{ConvertOptions, Smd};
use crate::pica::{CommandReader, PicaCodec, PicaRegister, TextureFormat};
use crate::serialization::{
    Reflect, RelocationKind, Section, Serializer, TypeKind, TypeRegistry,
};

const SKINNED_SMD: &str = "version 1
nodes
0 \"root\" -1
1 \"spine\" 0
2 \"head\" 1
end
skeleton
time 0
0 0 0 0 0 0 0
1 0 1 0 0.5 0 0
2 0 0.5 0 0 0 0.25
end
triangles
body.png
0 0 0 0 0 0 1 0 0 1 0 1
0 1 0 0 0 0 1 1 0 2 0 0.5 1 0.5
0 0 1 0 0 0 1 0 1 2 1 0.5 2 0.5
face
2 0 2 0 0 0 1 0.25 0.75
2 1 2 0 0 0 1 0.75 0.75
2 0 3 0 0 0 1 0.25 0.25
end
";

fn checker_rgba(size: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let value = if (i % size + i / size) % 2 == 0 { 255 } else { 32 };
            [value, value / 2, 255 - value, 255]
        })
        .collect()
}

fn skinned_scene() -> Scene {
    let smd: Smd = SKINNED_SMD.parse().expect("Failed to parse SMD");
    let mut scene = smd
        .to_scene(&ConvertOptions::default())
        .expect("Failed to convert SMD");

    let texture = Texture::from_rgba(
        "body",
        &checker_rgba(8),
        8,
        8,
        TextureFormat::Rgba8,
        &PicaCodec,
    )
    .unwrap();
    scene.add_texture(texture);
    scene
}

fn cube_texture() -> Texture {
    let faces = (0..6u8).map(|face| vec![face * 40; 64]).collect();
    Texture::new("sky", 8, 8, TextureFormat::L8, 1, faces).unwrap()
}

fn word_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

// ========================================================================
// Round Trips
// ========================================================================

#[test]
fn test_skinned_scene_round_trip() {
    let scene = skinned_scene();
    let bytes = scene.to_bytes().expect("Failed to serialize");
    let loaded = Scene::from_bytes(&bytes).expect("Failed to deserialize");

    assert_eq!(loaded, scene);

    let mesh = &loaded.models[0].meshes[0];
    let weights: Vec<[f32; 4]> = mesh.vertices.iter().map(|v| v.weights).collect();
    assert!(weights.contains(&[1.0, 0.0, 0.0, 0.0]));
    assert!(weights.contains(&[0.5, 0.5, 0.0, 0.0]));
}

#[test]
fn test_fractional_weights_round_trip() {
    let text = "nodes
0 \"root\" -1
1 \"tip\" 0
end
triangles
skin.png
0 0 0 0 0 0 1 0 0 2 0 0.333 1 0.667
0 1 0 0 0 0 1 1 0 2 0 0.334 1 0.666
0 0 1 0 0 0 1 0 1 2 0 0.25 1 0.748
end
";
    let smd: Smd = text.parse().unwrap();
    let scene = smd.to_scene(&ConvertOptions::default()).unwrap();
    let loaded = Scene::from_bytes(&scene.to_bytes().unwrap()).unwrap();

    assert_eq!(loaded, scene);
    let weights: Vec<[f32; 4]> = loaded.models[0].meshes[0]
        .vertices
        .iter()
        .map(|v| v.weights)
        .collect();
    assert_eq!(
        weights,
        vec![[0.33, 0.67, 0.0, 0.0], [0.33, 0.67, 0.0, 0.0], [0.25, 0.75, 0.0, 0.0]]
    );
}

#[test]
fn test_cube_map_round_trip() {
    let mut scene = Scene::new();
    scene.add_texture(cube_texture());

    let bytes = scene.to_bytes().unwrap();
    let loaded = Scene::from_bytes(&bytes).unwrap();

    let texture = &loaded.textures[0];
    assert!(texture.is_cube());
    for face in 0..6 {
        assert_eq!(texture.face(face).unwrap()[0], face as u8 * 40);
    }
    assert!(matches!(texture.face(6), Err(FormatError::FaceIndexOutOfRange(6))));
}

#[test]
fn test_file_round_trip() {
    let dir = std::env::temp_dir().join(format!("h3d_scene_file_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("model.bch");

    let scene = skinned_scene();
    scene.save_to_file(&path).unwrap();
    assert_eq!(Scene::load_from_file(&path).unwrap(), scene);

    std::fs::remove_dir_all(&dir).unwrap();
}

// ========================================================================
// Container Layout
// ========================================================================

#[test]
fn test_sections_aligned_and_ordered() {
    let bytes = skinned_scene().to_bytes().unwrap();
    let parsed = parse_h3d(&bytes).unwrap();

    let mut previous_end = HEADER_SIZE;
    for entry in parsed.header.sections {
        assert_eq!(entry.address as usize % SECTION_ALIGNMENT, 0);
        assert!(entry.address as usize >= previous_end);
        previous_end = (entry.address + entry.length) as usize;
    }
    assert_eq!(previous_end, bytes.len());
}

#[test]
fn test_every_relocation_points_into_its_target() {
    let mut scene = skinned_scene();
    scene.add_texture(cube_texture());
    let bytes = scene.to_bytes().unwrap();
    let parsed = parse_h3d(&bytes).unwrap();
    let header = &parsed.header;

    assert_eq!(
        header.address_count as usize,
        parsed.relocations.len()
    );

    let mut seen = std::collections::HashSet::new();
    for entry in parsed.relocations.entries() {
        let host = header.section(entry.kind.host());
        let target = header.section(entry.kind.target());
        let location = (host.address + entry.offset) as usize;
        assert!(seen.insert(location), "pointer at {location:#x} relocated twice");

        let pointer = word_at(&bytes, location);
        assert!(
            pointer >= target.address && pointer < target.address + target.length,
            "{:?} pointer {pointer:#x} outside {:?}",
            entry.kind,
            entry.kind.target()
        );
    }

    let texture_addresses = parsed
        .relocations
        .entries()
        .iter()
        .filter(|e| e.kind == RelocationKind::RawDataTexture)
        .count();
    // One 2D texture plus six cube faces.
    assert_eq!(texture_addresses, 7);
}

#[test]
fn test_texture_units_one_and_two_keep_zero_address() {
    let bytes = skinned_scene().to_bytes().unwrap();
    let mut parsed = parse_h3d(&bytes).unwrap();
    let raw = parsed.header.section(Section::RawData);

    let mut textures = parsed.contents.take_list("textures").unwrap();
    let texture = &mut textures[0];

    let unit0 = texture.take_commands("commands0").unwrap();
    let address = CommandReader::new(&unit0.words)
        .find_map(|c| c.value_for(PicaRegister::TEXUNIT0_ADDR1))
        .unwrap();
    assert!(address >= raw.address && address < raw.address + raw.length);

    for (field, register) in [
        ("commands1", PicaRegister::TEXUNIT1_ADDR),
        ("commands2", PicaRegister::TEXUNIT2_ADDR),
    ] {
        let blob = texture.take_commands(field).unwrap();
        let address = CommandReader::new(&blob.words).find_map(|c| c.value_for(register));
        assert_eq!(address, Some(0), "{field} address");
    }
}

#[test]
fn test_dimensions_come_from_commands() {
    let mut scene = Scene::new();
    let texture = Texture::from_rgba(
        "wide",
        &vec![0; 16 * 8 * 4],
        16,
        8,
        TextureFormat::Rgb565,
        &PicaCodec,
    )
    .unwrap();
    scene.add_texture(texture);

    let loaded = Scene::from_bytes(&scene.to_bytes().unwrap()).unwrap();
    assert_eq!((loaded.textures[0].width, loaded.textures[0].height), (16, 8));
    assert_eq!(loaded.textures[0].format, TextureFormat::Rgb565);
}

#[test]
fn test_oversized_texture_rejected() {
    let mut scene = Scene::new();
    scene.textures.push(
        Texture::new("huge", 2048, 8, TextureFormat::A8, 1, vec![vec![0; 2048 * 8]]).unwrap(),
    );
    assert!(matches!(
        scene.to_bytes(),
        Err(FormatError::TextureTooLarge { width: 2048, height: 8 })
    ));
}

// ========================================================================
// Failure Modes
// ========================================================================

#[test]
fn test_corrupt_mip_count_is_rejected() {
    let mut scene = Scene::new();
    let faces = vec![vec![0; 16 * 16 + 8 * 8]];
    scene.add_texture(Texture::new("ramp", 16, 16, TextureFormat::La4, 2, faces).unwrap());
    let mut bytes = scene.to_bytes().unwrap();

    // format La4 followed by the mip count
    let contents = parse_h3d(&bytes).unwrap().header.section(Section::Contents);
    let start = contents.address as usize;
    let end = start + contents.length as usize;
    let position = bytes[start..end]
        .windows(8)
        .position(|w| w == [9, 0, 0, 0, 2, 0, 0, 0])
        .expect("texture record not found");
    bytes[start + position + 4] = 40;

    assert!(matches!(
        Scene::from_bytes(&bytes),
        Err(FormatError::InvalidValue { what: "mipmap size", value: 40 })
    ));
}

#[test]
fn test_truncated_container_reports_offset() {
    let bytes = skinned_scene().to_bytes().unwrap();
    let parsed = parse_h3d(&bytes).unwrap();
    let relocations = parsed.header.section(Section::Relocations);

    let truncated = &bytes[..bytes.len() - 4];
    match Scene::from_bytes(truncated) {
        Err(FormatError::Truncated { offset, needed }) => {
            assert_eq!(offset, relocations.address as usize);
            assert_eq!(needed, relocations.length as usize);
        }
        other => panic!("expected truncation error, got {other:?}"),
    }
}

#[test]
fn test_unregistered_type_is_internal_error() {
    let scene = skinned_scene();

    let mut registry = TypeRegistry::new();
    registry.register_type::<Scene>();
    registry.register_type::<Model>();
    registry.register_type::<Material>();

    let result = Serializer::new(&registry).serialize(scene.to_record().unwrap());
    assert!(matches!(
        result,
        Err(FormatError::Internal(InternalError::UnregisteredType(
            TypeKind::Mesh | TypeKind::Bone | TypeKind::Texture | TypeKind::Lut
        )))
    ));
}

#[test]
fn test_strings_are_deduplicated() {
    let mut scene = Scene::new();
    let mut model = Model::new("shared");
    model.materials.push(Material::new("shared"));
    scene.models.push(model);

    let bytes = scene.to_bytes().unwrap();
    let parsed = parse_h3d(&bytes).unwrap();
    let strings = parsed.header.section(Section::Strings);
    // "shared\0" and "0@DefaultShader\0"
    assert_eq!(strings.length as usize, 7 + 16);
}

#[test]
fn test_name_with_nul_rejected() {
    let mut scene = Scene::new();
    scene.models.push(Model::new("body\0tail"));
    assert!(matches!(
        scene.to_bytes(),
        Err(FormatError::InvalidName(name)) if name == "body\0tail"
    ));
}
