//! Container analyzer tool.
//!
//! Displays the section layout, relocation statistics and a summary of the
//! models, materials and textures of a .bch container.
//!
//! Usage: cargo run -p h3d-info -- <file.bch> [--verbose|-v]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use h3d_scene::serialization::{Reflect, RelocationKind, Section};
use h3d_scene::{parse_h3d, Scene};

const SECTIONS: [Section; 5] = [
    Section::Contents,
    Section::Strings,
    Section::Commands,
    Section::RawData,
    Section::Relocations,
];

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <file.bch> [--verbose|-v]", args[0]);
        std::process::exit(1);
    }

    let path = &args[1];
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");

    if let Err(e) = analyze_container(path, verbose) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn analyze_container(path: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(path);
    let bytes = fs::read(path)?;
    let file_size = bytes.len() as u64;

    let parsed = parse_h3d(&bytes)?;
    let header = &parsed.header;

    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    println!("Container: {}", file_name);
    println!("File Size: {}", format_bytes(file_size));
    println!();

    println!("Header:");
    println!(
        "  Version: 0x{:02X} / 0x{:02X}",
        header.backward_compat, header.forward_compat
    );
    println!("  Converter: {}", header.converter_version);
    println!("  Flags: 0x{:04X}", header.flags);
    println!();

    println!("Sections:");
    println!(
        "  {:<12} {:>10} {:>12} {:>10}",
        "Section", "Address", "Length", "% of File"
    );
    println!("  {}", "-".repeat(48));
    for section in SECTIONS {
        let entry = header.section(section);
        let percent = if file_size > 0 {
            entry.length as f64 / file_size as f64 * 100.0
        } else {
            0.0
        };
        println!(
            "  {:<12} {:>#10X} {:>12} {:>9.1}%",
            format!("{:?}", section),
            entry.address,
            format_bytes(entry.length as u64),
            percent
        );
    }
    println!();

    let mut kinds: BTreeMap<u8, (RelocationKind, usize)> = BTreeMap::new();
    for entry in parsed.relocations.entries() {
        kinds.entry(entry.kind as u8).or_insert((entry.kind, 0)).1 += 1;
    }
    println!("Relocations: {}", parsed.relocations.len());
    for (kind, count) in kinds.values() {
        println!("  {:<16} {}", format!("{:?}", kind), count);
    }
    println!();

    let scene = Scene::from_record(parsed.contents)?;
    print_scene_summary(&scene);

    if verbose {
        println!();
        print_verbose_details(&scene);
    }

    Ok(())
}

fn print_scene_summary(scene: &Scene) {
    println!("Contents:");
    println!("  Models:    {}", scene.models.len());
    for model in &scene.models {
        let submeshes: usize = model.meshes.iter().map(|m| m.submeshes.len()).sum();
        let triangles: usize = model.meshes.iter().map(|m| m.triangle_count()).sum();
        println!(
            "    {:<24} {:>4} bones {:>4} meshes {:>5} sub-meshes {:>8} triangles",
            model.name,
            model.skeleton.len(),
            model.meshes.len(),
            submeshes,
            triangles
        );
    }
    println!("  Materials: {}", scene.materials.len());
    println!("  Textures:  {}", scene.textures.len());
    for texture in &scene.textures {
        let faces = if texture.is_cube() { "cube" } else { "2D" };
        println!(
            "    {:<24} {:>4}x{:<4} {:<10} {:<4} {}",
            texture.name,
            texture.width,
            texture.height,
            format!("{:?}", texture.format),
            faces,
            format_bytes((texture.face_length() * texture.faces().len()) as u64)
        );
    }
    println!("  LUTs:      {}", scene.luts.len());
}

fn print_verbose_details(scene: &Scene) {
    for model in &scene.models {
        println!("Model {}:", model.name);
        for (index, bone) in model.skeleton.iter().enumerate() {
            println!("  Bone {:>3} {:<24} parent {}", index, bone.name, bone.parent_index);
        }
        for (index, mesh) in model.meshes.iter().enumerate() {
            println!(
                "  Mesh {:>3}: material {} {:?} {} vertices, stride {}",
                index,
                mesh.material_index,
                mesh.skinning,
                mesh.vertices.len(),
                mesh.vertex_stride()
            );
            for submesh in &mesh.submeshes {
                println!(
                    "    {:?} {} triangles, bones {:?}",
                    submesh.skinning,
                    submesh.triangle_count(),
                    submesh.bone_indices
                );
            }
        }
        for material in &model.materials {
            println!(
                "  Material {:<24} textures [{}]",
                material.name,
                material.texture_names().collect::<Vec<_>>().join(", ")
            );
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
