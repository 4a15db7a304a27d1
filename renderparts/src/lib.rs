/*
Developer notes:
- The output folder is the only state that survives a run. Nothing remembers which parts are done,
    every pass rescans the folder, so a second machine rendering into the same shared folder just works.
    Two machines may still pick the same part at the same moment, the placeholder only narrows that window.
- Blender runs in its own process group. Ctrl-C here asks the scheduler to stop and lets the part in flight finish.
    A second Ctrl-C exits right away and leaves blender to finish on its own.
- Merge reads whatever the folder holds. Running it while a render is in progress is on the user.
*/
use anyhow::Context;
use blender::{
    blender::Blender,
    models::{engine::Engine, format::Format},
};
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use models::{
    job_config::{ConfigurationError, JobConfiguration},
    notification::Notification,
};
use routes::{job, settings};
use services::{
    blender_renderer::BlenderRenderer, image_reassembler::CanvasSize,
    render_scheduler::StopHandle,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod domains;
pub mod models;
pub mod routes;
pub mod services;

#[derive(Parser, Debug)]
#[command(name = "renderparts", version, about)]
struct Cli {
    /// Job configuration file. Defaults to the user's config directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print notifications as json lines
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    job: JobArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args, Debug, Default)]
struct JobArgs {
    /// Folder holding the rendered parts
    #[arg(long)]
    folder: Option<PathBuf>,
    #[arg(long)]
    prefix: Option<String>,
    /// Grid side N, the frame is split into N x N parts
    #[arg(long)]
    parts: Option<u32>,
    /// Crop every part to its region
    #[arg(long)]
    crop: Option<bool>,
    #[arg(long)]
    overwrite: Option<bool>,
    /// Launch renders without waiting for them, false reserves each part with a placeholder first
    #[arg(long)]
    interactive: Option<bool>,
    /// Output image format (png, jpeg, tga, tiff, ...)
    #[arg(long)]
    format: Option<Format>,
}

impl JobArgs {
    fn apply(self, config: &mut JobConfiguration) {
        if let Some(folder) = self.folder {
            config.output_folder = folder;
        }
        if let Some(prefix) = self.prefix {
            config.filename_prefix = prefix;
        }
        if let Some(parts) = self.parts {
            config.parts_count = parts;
        }
        if let Some(crop) = self.crop {
            config.crop_to_border = crop;
        }
        if let Some(overwrite) = self.overwrite {
            config.overwrite_existing = overwrite;
        }
        if let Some(interactive) = self.interactive {
            config.interactive_render = interactive;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render every missing part of the blend file
    Start {
        #[arg(long)]
        file: PathBuf,
        /// Blender executable
        #[arg(long, default_value = "blender")]
        blender: PathBuf,
        #[arg(long)]
        engine: Option<Engine>,
        #[arg(long)]
        frame: Option<i32>,
    },
    /// Show rendered parts and progress
    Status,
    /// Merge all parts into one image
    Merge {
        /// Frame width in pixels, inferred from the parts when omitted
        #[arg(long, requires = "height")]
        width: Option<u32>,
        #[arg(long, requires = "width")]
        height: Option<u32>,
        /// Open the output folder afterward
        #[arg(long)]
        open: bool,
    },
    /// Open the output folder
    Open,
    /// Print the effective configuration
    Config {
        /// Persist it as well
        #[arg(long)]
        save: bool,
    },
}

pub async fn run() -> ExitCode {
    dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();
    let json = cli.json;

    match execute(cli).await {
        Ok(notification) => {
            publish(&notification, json);
            if notification.is_error() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("{e:#}");
            publish(&Notification::error("RenderParts", format!("{e:#}")), json);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<JobConfiguration> {
    let config = match path {
        Some(path) => JobConfiguration::load_from(path)?,
        None => match JobConfiguration::load() {
            Ok(config) => config,
            Err(ConfigurationError::NoConfigDir) => {
                warn!("No user config directory, using defaults");
                JobConfiguration::default()
            }
            Err(e) => return Err(e.into()),
        },
    };
    Ok(config)
}

async fn execute(cli: Cli) -> anyhow::Result<Notification> {
    let mut config = load_config(cli.config.as_ref())?;
    cli.job.apply(&mut config);
    let json = cli.json;

    let notification = match cli.command {
        Commands::Start {
            file,
            blender,
            engine,
            frame,
        } => {
            let installation = Blender::from_executable(&blender)
                .await
                .with_context(|| format!("Unable to use blender at {}", blender.display()))?;
            info!(version = %installation.version, "Using blender");

            let mut renderer = BlenderRenderer::new(installation, &file, config.format.clone())
                .with_engine(engine)
                .with_frame(frame)
                .with_overwrite(config.overwrite_existing);
            let stop = StopHandle::default();
            let signal = tokio::spawn(watch_interrupt(stop.clone(), json));
            let notification = job::start(&config, &mut renderer, stop).await;
            signal.abort();
            notification
        }
        Commands::Status => {
            let (inventory, notification) = job::refresh(&config);
            if json {
                println!("{}", serde_json::to_string(&inventory)?);
            } else {
                for entry in inventory.entries() {
                    println!("{}", entry.image_name);
                }
            }
            notification
        }
        Commands::Merge {
            width,
            height,
            open,
        } => {
            let canvas = width
                .zip(height)
                .map(|(width, height)| CanvasSize::new(width, height));
            job::merge(&config, canvas, open)
        }
        Commands::Open => job::open_folder(&config),
        Commands::Config { save } => {
            println!("{}", settings::show_config(&config)?);
            if save {
                settings::save_config(&config, cli.config.as_deref())
            } else {
                Notification::info("Settings", "Effective configuration printed")
            }
        }
    };

    Ok(notification)
}

// first interrupt stops after the current part, the second one exits
async fn watch_interrupt(stop: StopHandle, json: bool) {
    let mut requested = false;
    while tokio::signal::ctrl_c().await.is_ok() {
        if requested {
            warn!("Interrupted twice, exiting now");
            std::process::exit(130);
        }
        requested = true;
        publish(&job::stop(&stop), json);
    }
}

fn publish(notification: &Notification, json: bool) {
    if json {
        match serde_json::to_string(notification) {
            Ok(line) => println!("{line}"),
            Err(e) => error!("Unable to serialize notification: {e}"),
        }
    } else if notification.is_error() {
        eprintln!("{notification}");
    } else {
        println!("{notification}");
    }
}
