//! Facepack CLI
//!
//! Entry point for the `facepack` command-line tool.

use clap::{Parser, Subcommand};
use facepack::pipeline::{is_risky_patch, PatchSummary};
use facepack::{
    compile, inspect, set_identifier, Backend, ContainerSerializer, ForgeConfig, ForgeError,
    ProjectDescriptor,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facepack")]
#[command(about = "Watch-face container builder and face ID patcher", version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a container from a project file without the external compiler
    Build {
        /// Project file (.toml flat form, .xml/.fprj nested form)
        project: PathBuf,

        /// Output file (default: <project stem>.face next to the project)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Image directory, relative to the project file
        #[arg(long)]
        image_dir: Option<PathBuf>,

        /// Path to config file (default: facepack.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Write a 9-character face ID into an existing artifact
    SetId {
        /// Artifact file to patch
        artifact: PathBuf,

        /// Face ID (exactly 9 ASCII characters)
        id: String,
    },

    /// Produce <output-dir>/output/<stem>.face and patch the face ID
    Compile {
        /// Project file
        project: PathBuf,

        /// Output directory (default: output)
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        /// Use the external compiler instead of the native serializer
        #[arg(long)]
        external: bool,

        /// Face ID override
        #[arg(long)]
        id: Option<String>,

        /// Path to config file (default: facepack.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Decode a container built by facepack
    Inspect {
        /// Container file
        artifact: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Build {
            project,
            output,
            image_dir,
            config,
        } => run_build(&project, output, image_dir, config.as_deref()),
        Commands::SetId { artifact, id } => run_set_id(&artifact, &id),
        Commands::Compile {
            project,
            output_dir,
            external,
            id,
            config,
            json,
        } => run_compile(&project, &output_dir, external, id, config.as_deref(), json),
        Commands::Inspect { artifact, json } => run_inspect(&artifact, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "facepack=debug" } else { "facepack=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_build(
    project: &Path,
    output: Option<PathBuf>,
    image_dir: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<(), ForgeError> {
    let config = ForgeConfig::load(config_path)?.with_overrides(None, None, image_dir)?;
    let output = match output {
        Some(path) => path,
        None => project.with_extension(facepack::toolchain::ARTIFACT_EXTENSION),
    };

    let descriptor = ProjectDescriptor::from_file(project)?;
    let size = ContainerSerializer::for_project(project, &config.image_dir)
        .build_to_file(&descriptor, &output)?;

    println!(
        "Built {} ({} components, {} bytes)",
        output.display(),
        descriptor.components.len(),
        size
    );
    Ok(())
}

fn run_set_id(artifact: &Path, id: &str) -> Result<(), ForgeError> {
    let outcome = set_identifier(artifact, id)?;
    if is_risky_patch(&outcome) {
        eprintln!("Warning: no ID slot found; the first 9 bytes of the file were overwritten");
    }
    println!("{}: {}", artifact.display(), PatchSummary::from(outcome).to_human());
    Ok(())
}

fn run_compile(
    project: &Path,
    output_dir: &Path,
    external: bool,
    id: Option<String>,
    config_path: Option<&Path>,
    json_output: bool,
) -> Result<(), ForgeError> {
    let backend = if external { Some(Backend::External) } else { None };
    let config = ForgeConfig::load(config_path)?.with_overrides(id, backend, None)?;

    let report = compile(&config, project, output_dir)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Face compiled: {}", report.artifact.display());
        println!("  Backend: {}", report.backend);
        println!("  Face ID: {} ({})", report.face_id, report.patch.to_human());
        println!("  Size: {} bytes", report.size);
        println!("  SHA-256: {}", report.sha256);
    }
    Ok(())
}

fn run_inspect(artifact: &Path, json_output: bool) -> Result<(), ForgeError> {
    let report = inspect(artifact)?;
    if json_output {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_human());
    }
    Ok(())
}
