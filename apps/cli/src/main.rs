use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use client_core::{
    load_settings, ClientEvent, ClientSettings, GenerationClient, GenerationHandle,
    GenerationState, SessionChange, SessionSnapshot, SystemApi,
};
use shared::{
    domain::{DepthTier, ExportBundle},
    protocol::{ExportOptions, StartRequest},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser, Debug)]
#[command(name = "casegen", about = "Generate test cases from a requirement")]
struct Cli {
    /// Service base url. Overrides casegen.toml.
    #[arg(long, global = true, env = "CASEGEN_BASE_URL")]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the three-layer generation and print progress as it arrives.
    Generate(GenerateArgs),
    /// Show the health of each LLM provider.
    Providers,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long, required_unless_present = "requirement_file")]
    requirement: Option<String>,
    /// Document whose text is extracted by the service and used as the requirement.
    #[arg(long, conflicts_with = "requirement")]
    requirement_file: Option<PathBuf>,
    #[arg(long)]
    feature: Option<String>,
    #[arg(long)]
    depth: Option<DepthTier>,
    #[arg(long)]
    provider: Option<String>,
    #[arg(long)]
    platform: Option<String>,

    /// Request the export bundle once generation is done.
    #[arg(long)]
    export: bool,
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    #[arg(long)]
    use_llm: bool,
    #[arg(long)]
    project: Option<String>,
    #[arg(long, default_value = "")]
    system: String,
    #[arg(long, default_value = "")]
    team: String,
    #[arg(long, default_value = "")]
    domain: String,
    #[arg(long)]
    folder: Option<String>,
    #[arg(long)]
    ke: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }

    let outcome = match cli.command {
        Command::Generate(args) => generate(&settings, args).await,
        Command::Providers => providers(&settings).await,
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("casegen: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn providers(settings: &ClientSettings) -> Result<ExitCode> {
    let providers = SystemApi::new(settings.base_url.as_str())
        .providers()
        .await
        .context("failed to fetch provider status")?;
    println!("{}", render::providers_table(&providers));
    Ok(ExitCode::SUCCESS)
}

async fn generate(settings: &ClientSettings, args: GenerateArgs) -> Result<ExitCode> {
    let requirement = match (&args.requirement, &args.requirement_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => {
            let parsed = SystemApi::new(settings.base_url.as_str())
                .parse_file(path)
                .await
                .with_context(|| format!("failed to extract text from {}", path.display()))?;
            info!(filename = %parsed.filename, size = parsed.size, "cli: requirement extracted");
            parsed.text
        }
        (None, None) => bail!("either --requirement or --requirement-file is needed"),
    };
    if requirement.trim().is_empty() {
        bail!("the requirement is empty");
    }

    let depth = args.depth.unwrap_or(settings.depth);
    let (low, high) = depth.expected_cases();
    info!(depth = %depth, "cli: expecting {low}-{high} cases");

    let request = StartRequest {
        requirement,
        feature: args.feature.clone().unwrap_or_else(|| settings.feature.clone()),
        depth,
        provider: args.provider.clone().unwrap_or_else(|| settings.provider.clone()),
        platform: args.platform.clone().unwrap_or_else(|| settings.platform.clone()),
    };

    let client = GenerationClient::new(settings).context("invalid service address")?;
    let snapshot = run_generation(&client, request).await?;
    if snapshot.state != GenerationState::Done {
        return Ok(ExitCode::FAILURE);
    }
    if !snapshot.qa_doc.is_empty() {
        info!(chars = snapshot.qa_doc.chars().count(), "cli: QA documentation received");
    }

    if args.export {
        let options = export_options(settings, &args);
        let bundle = run_export(&client, options).await?;
        let stamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M").to_string();
        for path in write_bundle(&bundle, &args.out_dir, &stamp).await? {
            println!("wrote {}", path.display());
        }
    }

    client.reset().await;
    Ok(ExitCode::SUCCESS)
}

fn export_options(settings: &ClientSettings, args: &GenerateArgs) -> ExportOptions {
    ExportOptions {
        project: args.project.clone().unwrap_or_else(|| settings.project.clone()),
        system: args.system.clone(),
        team: args.team.clone(),
        ke: args.ke,
        domain: args.domain.clone(),
        folder: args.folder.clone().unwrap_or_else(|| settings.folder.clone()),
        use_llm: args.use_llm,
        provider: args.provider.clone().unwrap_or_else(|| settings.provider.clone()),
    }
}

/// Starts a run and prints every change until the session settles.
async fn run_generation<H: GenerationHandle>(
    handle: &H,
    request: StartRequest,
) -> Result<SessionSnapshot> {
    let mut events = handle.subscribe_events();
    if let Err(err) = handle.start(request).await {
        warn!("cli: start failed: {err}");
    }

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(ClientEvent { state, change }) => {
                    if let Some(line) = render::change_line(&change) {
                        println!("{line}");
                    }
                    if state.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "cli: event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.reset().await;
                bail!("interrupted");
            }
        }
    }

    Ok(handle.snapshot().await)
}

async fn run_export<H: GenerationHandle>(handle: &H, options: ExportOptions) -> Result<ExportBundle> {
    let mut events = handle.subscribe_events();
    handle
        .export(options)
        .await
        .context("failed to request export")?;

    loop {
        match events.recv().await {
            Ok(ClientEvent {
                change: SessionChange::ExportReady,
                ..
            }) => break,
            Ok(ClientEvent {
                change: SessionChange::Failed { message, .. },
                ..
            }) => bail!("export failed: {message}"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "cli: event stream lagged"),
            Err(RecvError::Closed) => bail!("event stream closed before the export arrived"),
        }
    }

    handle
        .snapshot()
        .await
        .export_result
        .context("export finished without a bundle")
}

async fn write_bundle(bundle: &ExportBundle, out_dir: &Path, stamp: &str) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(3);
    for (extension, body) in [("xml", &bundle.xml), ("csv", &bundle.csv), ("md", &bundle.md)] {
        let path = out_dir.join(render::export_file_name(stamp, extension));
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
