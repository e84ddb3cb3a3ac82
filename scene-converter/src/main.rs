use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use h3d_scene::import_export::{ConvertOptions, Smd, SmdExportOptions, DEFAULT_BONE_LIMIT};
use h3d_scene::pica::PicaCodec;
use h3d_scene::Scene;

#[derive(Parser)]
#[command(name = "h3d-converter")]
#[command(about = "Convert between .bch containers and SMD models")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one model of a container as SMD
    ToSmd {
        /// Input container (.bch)
        input: PathBuf,

        /// Output path (defaults to the input filename with .smd extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Index of the model to extract
        #[arg(long, default_value_t = 0)]
        model: usize,

        /// Also write face 0 of every texture as PNG next to the output
        #[arg(long)]
        textures: bool,
    },

    /// Build a container from an SMD model
    ToBch {
        /// Input model (.smd)
        input: PathBuf,

        /// Output path (defaults to the input filename with .bch extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory searched for material textures
        #[arg(long)]
        texture_dir: Option<PathBuf>,

        /// Bones per sub-mesh (at least 12)
        #[arg(long, default_value_t = DEFAULT_BONE_LIMIT)]
        bone_limit: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::ToSmd {
            input,
            output,
            model,
            textures,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("smd"));

            eprintln!("Loading {}...", input.display());
            let scene = Scene::load_from_file(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            print_stats(&scene);

            let smd = Smd::from_scene(&scene, &SmdExportOptions { model_index: model })?;
            eprintln!("Saving to {}...", output.display());
            smd.save(&output)?;

            if textures {
                let dir = output.parent().map(PathBuf::from).unwrap_or_default();
                for texture in &scene.textures {
                    let path = dir.join(format!("{}.png", texture.name));
                    match texture.save_png(0, &path, &PicaCodec) {
                        Ok(()) => eprintln!("  Wrote {}", path.display()),
                        Err(e) => log::warn!("Skipping texture {}: {e}", texture.name),
                    }
                }
            }
        }
        Command::ToBch {
            input,
            output,
            texture_dir,
            bone_limit,
        } => {
            if bone_limit < 12 {
                bail!("Bone limit must be at least 12, got {bone_limit}");
            }
            let output = output.unwrap_or_else(|| input.with_extension("bch"));

            eprintln!("Loading {}...", input.display());
            let smd = Smd::load(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;

            let options = ConvertOptions {
                bone_limit,
                texture_search_path: texture_dir.or_else(|| input.parent().map(PathBuf::from)),
                ..ConvertOptions::default()
            };
            let scene = smd.to_scene(&options)?;
            print_stats(&scene);

            eprintln!("Saving to {}...", output.display());
            scene.save_to_file(&output)?;

            let file_size = std::fs::metadata(&output)?.len();
            eprintln!("Done. Output: {} ({})", output.display(), format_bytes(file_size));
        }
    }

    Ok(())
}

fn print_stats(scene: &Scene) {
    let meshes: usize = scene.models.iter().map(|m| m.meshes.len()).sum();
    let submeshes: usize = scene
        .models
        .iter()
        .flat_map(|m| &m.meshes)
        .map(|m| m.submeshes.len())
        .sum();
    eprintln!("  Models:    {}", scene.models.len());
    eprintln!("  Meshes:    {} ({} sub-meshes)", meshes, submeshes);
    eprintln!("  Materials: {}", scene.materials.len());
    eprintln!("  Textures:  {}", scene.textures.len());
    eprintln!("  LUTs:      {}", scene.luts.len());
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
