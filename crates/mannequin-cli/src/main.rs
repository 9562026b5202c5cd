use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mannequin_contracts::commands::{parse_command, SessionCommand, SESSION_HELP_COMMANDS};
use mannequin_contracts::config::{MannequinConfig, NormalizeParams};
use mannequin_contracts::events::EventWriter;
use mannequin_contracts::export::sanitize_pose_id;
use mannequin_contracts::models::{ModelRegistry, EDIT_CAPABILITY};
use mannequin_engine::{
    export_session, normalize_bytes, save_variant, AngleOutcome, BatchReport, Orchestrator,
    SourceImage, VariantSession,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the run finished but at least one angle has no image.
const EXIT_INCOMPLETE: i32 = 3;

#[derive(Debug, Parser)]
#[command(
    name = "mannequin",
    version,
    about = "Turns a pose photo into grey mannequin renders from several camera angles"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate every angle for one photo and export the batch.
    Generate(GenerateArgs),
    /// Interactive session: generate, regenerate single angles, save, export.
    Session(SessionArgs),
    /// Run only the size-constrained normalizer on a local image.
    Normalize(NormalizeArgs),
    /// List the image models this build knows about.
    Models,
}

#[derive(Debug, Clone, clap::Args)]
struct ConfigArgs {
    /// JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Image model; wins over MANNEQUIN_IMAGE_MODEL and the config file.
    #[arg(long)]
    model: Option<String>,
    /// Event log path (defaults to <out>/events.jsonl).
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    image: PathBuf,
    /// Pose identifier used in output file names.
    #[arg(long, default_value = "untitled")]
    id: String,
    #[arg(long)]
    out: PathBuf,
    /// Restrict the run to these angles (repeatable).
    #[arg(long = "angle")]
    angles: Vec<String>,
    #[command(flatten)]
    common: ConfigArgs,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "untitled")]
    id: String,
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[command(flatten)]
    common: ConfigArgs,
}

#[derive(Debug, Parser)]
struct NormalizeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    width: Option<u32>,
    /// Height over width.
    #[arg(long)]
    aspect: Option<f64>,
    #[arg(long = "max-kb")]
    max_kb: Option<f64>,
    #[arg(long)]
    floor: Option<u8>,
    #[arg(long)]
    step: Option<u8>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mannequin error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mannequin={level},mannequin_engine={level}").into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<i32> {
    let stdout = io::stdout();
    match cli.command {
        Command::Generate(args) => run_generate(args, &mut stdout.lock()),
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
        Command::Normalize(args) => {
            run_normalize(args, &mut stdout.lock())?;
            Ok(0)
        }
        Command::Models => {
            run_models(&mut stdout.lock())?;
            Ok(0)
        }
    }
}

fn load_config(common: &ConfigArgs) -> Result<MannequinConfig> {
    let mut config = MannequinConfig::load(common.config.as_deref())?;
    if let Some(model) = common
        .model
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        config.model = Some(model.to_string());
    }
    Ok(config)
}

fn events_path(common: &ConfigArgs, out: &Path) -> PathBuf {
    common
        .events
        .clone()
        .unwrap_or_else(|| out.join("events.jsonl"))
}

fn run_generate(args: GenerateArgs, out: &mut impl Write) -> Result<i32> {
    let config = load_config(&args.common)?;
    let angles = config.angles.subset(&args.angles)?;
    let source = SourceImage::open(&args.image)?;
    let session = VariantSession::new(angles);
    let events = EventWriter::new(events_path(&args.common, &args.out), session.session_id());
    let orchestrator = Orchestrator::from_config(&config, events)?;
    generate_and_export(&orchestrator, session, &source, &args.id, &args.out, out)
}

/// Runs one batch and exports whatever succeeded. A provider rejection is
/// returned as an error and nothing is exported.
fn generate_and_export(
    orchestrator: &Orchestrator,
    mut session: VariantSession,
    source: &SourceImage,
    pose_id: &str,
    out_dir: &Path,
    out: &mut impl Write,
) -> Result<i32> {
    if let Some(note) = orchestrator.selection_note() {
        writeln!(out, "{note}")?;
    }

    orchestrator.start_session(&session);
    let report = orchestrator.generate_batch(&mut session, source)?;
    print_report(&report, out)?;

    if session.populated_count() > 0 {
        let summary = export_session(
            &session,
            pose_id,
            out_dir,
            orchestrator.normalize_params(),
            orchestrator.events(),
        )?;
        writeln!(
            out,
            "Exported {} file(s) to {}",
            summary.files.len(),
            summary.directory.display()
        )?;
    }

    Ok(if report.all_succeeded() {
        0
    } else {
        EXIT_INCOMPLETE
    })
}

fn print_report(report: &BatchReport, out: &mut impl Write) -> Result<()> {
    for outcome in &report.outcomes {
        match outcome {
            AngleOutcome::Generated {
                angle,
                quality,
                size_kb,
                within_budget,
            } => {
                let note = if *within_budget { "" } else { " (over budget)" };
                writeln!(out, "{angle}: ok, quality {quality}, {size_kb:.1} KB{note}")?;
            }
            AngleOutcome::Failed(failure) => writeln!(out, "{failure}")?,
        }
    }
    Ok(())
}

fn run_session(args: SessionArgs) -> Result<()> {
    let config = load_config(&args.common)?;
    let session = VariantSession::new(config.angles.clone());
    let events = EventWriter::new(events_path(&args.common, &args.out), session.session_id());
    let orchestrator = Orchestrator::from_config(&config, events)?;
    let source = args
        .image
        .as_deref()
        .map(SourceImage::open)
        .transpose()?;

    let mut state = SessionState {
        orchestrator,
        session,
        source,
        pose_id: args.id,
        out_dir: args.out,
    };
    state.orchestrator.start_session(&state.session);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Some(note) = state.orchestrator.selection_note() {
        writeln!(out, "{note}")?;
    }
    writeln!(out, "Mannequin session started. Type /help for commands.")?;

    let mut line = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        let read = match stdin.lock().read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }
        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        if !state.handle(command, &mut out)? {
            break;
        }
    }
    Ok(())
}

struct SessionState {
    orchestrator: Orchestrator,
    session: VariantSession,
    source: Option<SourceImage>,
    pose_id: String,
    out_dir: PathBuf,
}

impl SessionState {
    /// Runs one command. Returns `false` once the session should end.
    /// Command failures are printed; only output errors propagate.
    fn handle(&mut self, command: SessionCommand, out: &mut impl Write) -> Result<bool> {
        match command {
            SessionCommand::Noop => {}
            SessionCommand::Quit => return Ok(false),
            SessionCommand::Help => {
                writeln!(out, "Commands: {}", SESSION_HELP_COMMANDS.join(" "))?;
            }
            SessionCommand::Generate => {
                let Some(source) = self.source.as_ref() else {
                    writeln!(out, "No source image; use /source <path> first.")?;
                    return Ok(true);
                };
                match self.orchestrator.generate_batch(&mut self.session, source) {
                    Ok(report) => print_report(&report, out)?,
                    Err(err) => writeln!(out, "Generation stopped: {err}")?,
                }
            }
            SessionCommand::Regenerate { angle } => {
                let Some(source) = self.source.as_ref() else {
                    writeln!(out, "No source image; use /source <path> first.")?;
                    return Ok(true);
                };
                match self
                    .orchestrator
                    .regenerate(&mut self.session, &angle, source)
                {
                    Ok(variant) => writeln!(
                        out,
                        "{}: regenerated, quality {}, {:.1} KB",
                        variant.angle, variant.normalized.quality, variant.normalized.size_kb
                    )?,
                    Err(failure) => writeln!(out, "{failure}")?,
                }
            }
            SessionCommand::Save { angle, dir } => {
                let dir = dir.map(PathBuf::from).unwrap_or_else(|| self.out_dir.clone());
                match save_variant(&self.session, &angle, &self.pose_id, &dir) {
                    Ok(path) => writeln!(out, "Saved {}", path.display())?,
                    Err(err) => writeln!(out, "Save failed: {err:#}")?,
                }
            }
            SessionCommand::Export { dir } => {
                let dir = dir.map(PathBuf::from).unwrap_or_else(|| self.out_dir.clone());
                let result = export_session(
                    &self.session,
                    &self.pose_id,
                    &dir,
                    self.orchestrator.normalize_params(),
                    self.orchestrator.events(),
                );
                match result {
                    Ok(summary) => {
                        writeln!(
                            out,
                            "Exported {} file(s) to {}",
                            summary.files.len(),
                            summary.directory.display()
                        )?;
                        if !summary.missing.is_empty() {
                            writeln!(out, "Missing: {}", summary.missing.join(", "))?;
                        }
                    }
                    Err(err) => writeln!(out, "Export failed: {err:#}")?,
                }
            }
            SessionCommand::SetPoseId { id } => {
                self.pose_id = id;
                writeln!(out, "Pose id set to {}", sanitize_pose_id(&self.pose_id))?;
            }
            SessionCommand::SetSource { path } => match SourceImage::open(Path::new(&path)) {
                Ok(source) => {
                    let (width, height) = source.dimensions();
                    writeln!(out, "Source set to {path} ({width}x{height})")?;
                    self.source = Some(source);
                }
                Err(err) => writeln!(out, "Source not loaded: {err}")?,
            },
            SessionCommand::Status => self.print_status(out)?,
            SessionCommand::Angles => {
                for angle in self.session.angles() {
                    writeln!(out, "{}: {}", angle.label, angle.fragment)?;
                }
            }
            SessionCommand::MissingArgument { command } => {
                writeln!(out, "/{command} requires an argument")?;
            }
            SessionCommand::Unknown { command, .. } => {
                writeln!(out, "Unknown command: /{command}. Type /help for commands.")?;
            }
        }
        Ok(true)
    }

    fn print_status(&self, out: &mut impl Write) -> Result<()> {
        writeln!(
            out,
            "Model: {} ({})",
            self.orchestrator.model().name,
            self.orchestrator.provider_name()
        )?;
        writeln!(out, "Pose id: {}", sanitize_pose_id(&self.pose_id))?;
        match self.source.as_ref() {
            Some(source) => {
                let (width, height) = source.dimensions();
                writeln!(out, "Source: {width}x{height} {}", source.mime_type())?;
            }
            None => writeln!(out, "Source: none")?,
        }
        for (label, slot) in self.session.slots() {
            match slot {
                Some(variant) => writeln!(
                    out,
                    "{label}: {}x{}, quality {}, {:.1} KB",
                    variant.normalized.width,
                    variant.normalized.height,
                    variant.normalized.quality,
                    variant.normalized.size_kb
                )?,
                None => writeln!(out, "{label}: absent")?,
            }
        }
        Ok(())
    }
}

fn run_normalize(args: NormalizeArgs, out: &mut impl Write) -> Result<()> {
    let defaults = NormalizeParams::default();
    let params = NormalizeParams {
        target_width: args.width.unwrap_or(defaults.target_width),
        aspect_ratio: args.aspect.unwrap_or(defaults.aspect_ratio),
        max_kilobytes: args.max_kb.unwrap_or(defaults.max_kilobytes),
        quality_floor: args.floor.unwrap_or(defaults.quality_floor),
        quality_step: args.step.unwrap_or(defaults.quality_step),
    };
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("failed reading {}", args.input.display()))?;
    let result = normalize_bytes(&bytes, &params)?;
    if let Some(parent) = args.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&args.output, &result.bytes)
        .with_context(|| format!("failed writing {}", args.output.display()))?;
    writeln!(
        out,
        "Wrote {} ({}x{}, quality {}, {:.1} KB in {} pass(es))",
        args.output.display(),
        result.width,
        result.height,
        result.quality,
        result.size_kb,
        result.attempts.len()
    )?;
    if !result.within_budget() {
        tracing::warn!(
            size_kb = result.size_kb,
            budget_kb = result.budget_kb,
            "quality floor reached above the size budget"
        );
    }
    Ok(())
}

fn run_models(out: &mut impl Write) -> Result<()> {
    let registry = ModelRegistry::default();
    let default_model = registry
        .by_capability(EDIT_CAPABILITY)
        .first()
        .map(|model| model.name.clone());
    for model in registry.list() {
        let marker = if default_model.as_deref() == Some(model.name.as_str()) {
            " (default)"
        } else {
            ""
        };
        writeln!(
            out,
            "{}\t{}\t{}{}",
            model.name,
            model.provider,
            model.capabilities.join(","),
            marker
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;

    use clap::{CommandFactory, Parser};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use mannequin_contracts::angles::AngleSet;
    use mannequin_contracts::commands::parse_command;
    use mannequin_contracts::config::{GenerationSettings, MannequinConfig, NormalizeParams};
    use mannequin_contracts::events::EventWriter;
    use mannequin_contracts::models::ModelRegistry;
    use mannequin_engine::{
        GenerationRequest, GenerationResponse, ImageProvider, InlineImage, Orchestrator,
        ProviderRejection, SourceImage, VariantSession,
    };
    use serde_json::{json, Value};

    use super::{
        generate_and_export, run_generate, run_models, run_normalize, Cli, Command, ConfigArgs,
        GenerateArgs, NormalizeArgs, SessionState, EXIT_INCOMPLETE,
    };

    /// Answers every angle with a small PNG except the ones listed, which
    /// fail with a transient error or a key rejection.
    struct FlakyProvider {
        failing: Vec<String>,
        rejects_key: bool,
    }

    impl ImageProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<GenerationResponse> {
            if self.rejects_key {
                return Err(ProviderRejection::Credentials {
                    provider: "Gemini".to_string(),
                    status: 400,
                    detail: "API key not valid. Please pass a valid API key.".to_string(),
                }
                .into());
            }
            if self
                .failing
                .iter()
                .any(|fragment| request.prompt.contains(fragment.as_str()))
            {
                anyhow::bail!("503 service unavailable");
            }
            Ok(GenerationResponse {
                image: Some(InlineImage {
                    bytes: png_bytes(8, 12)?,
                    mime_type: Some("image/png".to_string()),
                }),
                ..GenerationResponse::default()
            })
        }
    }

    fn flaky_orchestrator(provider: FlakyProvider) -> anyhow::Result<Orchestrator> {
        let model = ModelRegistry::default()
            .get("dryrun-image-1")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("dryrun model missing from registry"))?;
        let settings = GenerationSettings {
            pause_ms: 0,
            ..GenerationSettings::default()
        };
        Ok(Orchestrator::new(Box::new(provider), model, settings).with_normalize(
            NormalizeParams {
                target_width: 40,
                ..NormalizeParams::default()
            },
        ))
    }

    fn fragment(label: &str) -> String {
        AngleSet::default()
            .get(label)
            .map(|angle| angle.fragment.clone())
            .unwrap_or_default()
    }

    fn write_png(path: &Path, width: u32, height: u32) -> anyhow::Result<()> {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 150, 120])))
            .save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    fn png_bytes(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([180, 150, 120])))
            .write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    fn write_fast_config(path: &Path) -> anyhow::Result<()> {
        let config = json!({
            "normalize": {"target_width": 60},
            "generation": {"pause_ms": 0}
        });
        fs::write(path, serde_json::to_string(&config)?)?;
        Ok(())
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_args_collect_repeated_angles() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "mannequin",
            "generate",
            "--image",
            "pose.png",
            "--out",
            "out",
            "--angle",
            "Front",
            "--angle",
            "Low",
            "--model",
            "dryrun-image-1",
        ])?;
        let Command::Generate(args) = cli.command else {
            anyhow::bail!("expected generate");
        };
        assert_eq!(args.angles, vec!["Front", "Low"]);
        assert_eq!(args.id, "untitled");
        assert_eq!(args.common.model.as_deref(), Some("dryrun-image-1"));
        Ok(())
    }

    #[test]
    fn generate_with_dryrun_exports_batch() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = temp.path().join("pose.png");
        let config = temp.path().join("config.json");
        let out_dir = temp.path().join("out");
        write_png(&image, 40, 30)?;
        write_fast_config(&config)?;

        let mut out = Vec::new();
        let code = run_generate(
            GenerateArgs {
                image,
                id: "42".to_string(),
                out: out_dir.clone(),
                angles: vec!["front".to_string(), "High".to_string()],
                common: ConfigArgs {
                    config: Some(config),
                    model: Some("dryrun-image-1".to_string()),
                    events: None,
                },
            },
            &mut out,
        )?;
        assert_eq!(code, 0);
        assert!(out_dir.join("pose_42_Front.jpg").exists());
        assert!(out_dir.join("pose_42_High.jpg").exists());
        assert!(!out_dir.join("pose_42_Low.jpg").exists());

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join("manifest.json"))?)?;
        assert_eq!(manifest["target_width"], json!(60));
        assert_eq!(manifest["target_height"], json!(90));
        assert_eq!(manifest["variants"].as_array().map(Vec::len), Some(2));

        let stdout = String::from_utf8(out)?;
        assert!(stdout.contains("Front: ok"));
        assert!(stdout.contains("Exported 2 file(s)"));
        assert!(fs::read_to_string(out_dir.join("events.jsonl"))?.contains("batch_finished"));
        Ok(())
    }

    #[test]
    fn generate_rejects_unknown_angle_before_any_request() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = temp.path().join("pose.png");
        write_png(&image, 10, 10)?;
        let result = run_generate(
            GenerateArgs {
                image,
                id: "1".to_string(),
                out: temp.path().join("out"),
                angles: vec!["Side".to_string()],
                common: ConfigArgs {
                    config: None,
                    model: Some("dryrun-image-1".to_string()),
                    events: None,
                },
            },
            &mut Vec::new(),
        );
        let message = result.err().map(|err| err.to_string()).unwrap_or_default();
        assert!(message.contains("unknown angle 'Side'"));
        assert!(!temp.path().join("out").exists());
        Ok(())
    }

    #[test]
    fn partial_batch_exits_incomplete_and_exports_the_rest() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out_dir = temp.path().join("out");
        let orchestrator = flaky_orchestrator(FlakyProvider {
            failing: vec![fragment("Low")],
            rejects_key: false,
        })?;
        let source = SourceImage::from_bytes(png_bytes(20, 30)?)?;

        let mut out = Vec::new();
        let code = generate_and_export(
            &orchestrator,
            VariantSession::new(AngleSet::default()),
            &source,
            "9",
            &out_dir,
            &mut out,
        )?;
        assert_eq!(code, EXIT_INCOMPLETE);
        for label in ["Front", "Quarter", "High"] {
            assert!(out_dir.join(format!("pose_9_{label}.jpg")).exists());
        }
        assert!(!out_dir.join("pose_9_Low.jpg").exists());

        let manifest: Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join("manifest.json"))?)?;
        assert_eq!(manifest["variants"].as_array().map(Vec::len), Some(3));
        let stdout = String::from_utf8(out)?;
        assert!(stdout.contains("Low failed: 503 service unavailable"));
        assert!(stdout.contains("Exported 3 file(s)"));
        Ok(())
    }

    #[test]
    fn rejected_key_is_fatal_and_exports_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out_dir = temp.path().join("out");
        let orchestrator = flaky_orchestrator(FlakyProvider {
            failing: Vec::new(),
            rejects_key: true,
        })?;
        let source = SourceImage::from_bytes(png_bytes(20, 30)?)?;

        let mut out = Vec::new();
        let err = generate_and_export(
            &orchestrator,
            VariantSession::new(AngleSet::default()),
            &source,
            "9",
            &out_dir,
            &mut out,
        )
        .err()
        .ok_or_else(|| anyhow::anyhow!("a rejected key must fail the run"))?;
        assert_eq!(
            format!("{err:#}"),
            "Gemini rejected the API key (400): API key not valid. Please pass a valid API key."
        );
        assert!(!out_dir.join("manifest.json").exists());
        assert!(String::from_utf8(out)?.is_empty());
        Ok(())
    }

    #[test]
    fn session_reports_rejected_key_once_and_keeps_running() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut state = SessionState {
            orchestrator: flaky_orchestrator(FlakyProvider {
                failing: Vec::new(),
                rejects_key: true,
            })?,
            session: VariantSession::new(AngleSet::default()),
            source: Some(SourceImage::from_bytes(png_bytes(20, 30)?)?),
            pose_id: "untitled".to_string(),
            out_dir: temp.path().join("out"),
        };
        let mut out = Vec::new();
        assert!(state.handle(parse_command("/generate"), &mut out)?);

        let stdout = String::from_utf8(out)?;
        assert_eq!(stdout.matches("rejected the API key").count(), 1);
        assert!(stdout.starts_with("Generation stopped: Gemini rejected the API key (400)"));
        Ok(())
    }

    #[test]
    fn session_commands_drive_generation_and_export() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image = temp.path().join("pose.png");
        write_png(&image, 24, 36)?;
        let mut config = MannequinConfig {
            model: Some("dryrun-image-1".to_string()),
            ..MannequinConfig::default()
        };
        config.normalize.target_width = 50;
        config.generation.pause_ms = 0;
        let orchestrator =
            Orchestrator::from_config_with(&config, EventWriter::disabled("s"), |_| None)?;

        let mut state = SessionState {
            orchestrator,
            session: VariantSession::new(config.angles.clone()),
            source: None,
            pose_id: "untitled".to_string(),
            out_dir: temp.path().join("out"),
        };
        let mut out = Vec::new();
        let mut send = |state: &mut SessionState, line: &str| -> anyhow::Result<bool> {
            state.handle(parse_command(line), &mut out)
        };

        assert!(send(&mut state, "/generate")?);
        assert!(send(&mut state, format!("/source \"{}\"", image.display()).as_str())?);
        assert!(send(&mut state, "/id pose 7")?);
        assert!(send(&mut state, "/regen low")?);
        assert!(send(&mut state, "/save Low")?);
        assert!(send(&mut state, "/generate")?);
        assert!(send(&mut state, "/export")?);
        assert!(send(&mut state, "/status")?);
        assert!(send(&mut state, "/bogus")?);
        assert!(!send(&mut state, "/quit")?);

        let stdout = String::from_utf8(out)?;
        assert!(stdout.contains("No source image"));
        assert!(stdout.contains("Source set to"));
        assert!(stdout.contains("Pose id set to pose_7"));
        assert!(stdout.contains("Low: regenerated"));
        assert!(stdout.contains("Exported 4 file(s)"));
        assert!(stdout.contains("Low: 50x75"));
        assert!(stdout.contains("Unknown command: /bogus"));
        assert!(temp.path().join("out").join("pose_pose_7_Low.jpg").exists());
        assert!(temp.path().join("out").join("manifest.json").exists());
        Ok(())
    }

    #[test]
    fn normalize_command_writes_target_dimensions() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let input = temp.path().join("in.png");
        let output = temp.path().join("nested").join("out.jpg");
        write_png(&input, 400, 300)?;

        let mut out = Vec::new();
        run_normalize(
            NormalizeArgs {
                input,
                output: output.clone(),
                width: Some(100),
                aspect: None,
                max_kb: None,
                floor: None,
                step: None,
            },
            &mut out,
        )?;
        let written = SourceImage::open(&output)?;
        assert_eq!(written.dimensions(), (100, 150));
        assert_eq!(written.mime_type(), "image/jpeg");
        assert!(String::from_utf8(out)?.contains("quality 95"));
        Ok(())
    }

    #[test]
    fn models_lists_default_marker() -> anyhow::Result<()> {
        let mut out = Vec::new();
        run_models(&mut out)?;
        let listing = String::from_utf8(out)?;
        let first = listing.lines().next().unwrap_or_default();
        assert!(first.starts_with("gemini-2.5-flash-image\tgemini"));
        assert!(first.ends_with("(default)"));
        assert!(listing.contains("dryrun-image-1\tdryrun"));
        Ok(())
    }
}
