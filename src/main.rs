use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use lume_fx::lut::authoring::{write_featured, FEATURED_CUBE_SIZE};
use lume_fx::lut::parse_cube;
use lume_fx::settings::KernelBackendChoice;
use lume_fx::{make_proxy, EditState, Engine, EngineSettings, ExportRequest, SourceImage};

#[derive(Parser, Debug)]
#[command(name = "lume-fx", version, about = "Photo effects and color grading")]
struct Cli {
    /// Settings JSON; the platform config file is used when omitted.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Verbose logging.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply an edit to an image and export the result.
    Render(RenderArgs),
    /// Write the featured looks as .cube files.
    GenerateLuts(GenerateArgs),
    /// Parse a .cube file and report its dimension.
    InspectLut(InspectArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[arg(long)]
    input: PathBuf,

    /// Output path; .jpg/.jpeg or .png.
    #[arg(long)]
    output: PathBuf,

    /// EditState JSON.
    #[arg(long)]
    state: Option<PathBuf>,

    /// Preset id, overriding the one in the state file.
    #[arg(long)]
    preset: Option<String>,

    /// Render the bounded-resolution proxy instead of the full image.
    #[arg(long, default_value_t = false)]
    proxy: bool,

    /// Kernel back end: auto, gpu or cpu.
    #[arg(long)]
    backend: Option<KernelBackendChoice>,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    #[arg(long)]
    out: PathBuf,

    /// Lattice size per axis.
    #[arg(long, default_value_t = FEATURED_CUBE_SIZE)]
    size: usize,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.settings {
        Some(path) => EngineSettings::load_from(path).with_context(|| format!("load settings '{}'", path.display()))?,
        None => EngineSettings::load(),
    };
    lume_fx::logging::init_tracing(cli.debug || settings.enable_debug_logging);

    match cli.cmd {
        Command::Render(args) => cmd_render(args, settings),
        Command::GenerateLuts(args) => cmd_generate(args),
        Command::InspectLut(args) => cmd_inspect(args),
    }
}

fn cmd_render(args: RenderArgs, mut settings: EngineSettings) -> anyhow::Result<()> {
    if let Some(backend) = args.backend {
        settings.kernel_backend = backend;
    }

    let mut state = match &args.state {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("read state '{}'", path.display()))?;
            serde_json::from_str::<EditState>(&text).with_context(|| format!("parse state '{}'", path.display()))?
        }
        None => EditState::default(),
    };
    if let Some(preset) = args.preset {
        state.preset_id = Some(preset);
    }
    if let Err(e) = state.validate() {
        log::warn!("{}; values were clamped", e);
    }

    let mut source = SourceImage::open(&args.input).with_context(|| format!("open '{}'", args.input.display()))?;
    if args.proxy {
        source = make_proxy(&source, settings.proxy_max_dimension);
    }

    let engine = Engine::new(settings);
    let exporter = engine.exporter()?;
    let outcome = exporter
        .export(ExportRequest::new(source, state.clamped(), &args.output))
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    exporter.shutdown();

    eprintln!(
        "wrote {} ({}x{}, {} ms)",
        outcome.path.display(),
        outcome.width,
        outcome.height,
        outcome.elapsed.as_millis()
    );
    engine.teardown();
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let written = write_featured(&args.out, args.size).with_context(|| format!("write LUTs to '{}'", args.out.display()))?;
    for path in written {
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file).with_context(|| format!("read '{}'", args.file.display()))?;
    let name = args.file.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    match parse_cube(&name, &text) {
        Ok(lut) => {
            println!("{}: valid, {}x{}x{}", name, lut.size(), lut.size(), lut.size());
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: invalid ({})", name, e),
    }
}
