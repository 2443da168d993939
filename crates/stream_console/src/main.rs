use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine_logging::{initialize, LogDestination};
use log::LevelFilter;
use stream_core::{Audit, Chat, FileProcessing, Outcome, TargetId, Vocabulary};
use stream_engine::{
    requests, ReqwestTransport, SessionController, SessionSettings, StaticCredentials,
};

mod app;
mod config;
mod effects;
mod render;

use app::Job;
use config::ConsoleConfig;

const LOG_FILENAME: &str = "./stream_console.log";

/// Target used for a chat that has no conversation yet.
const NEW_CHAT_TARGET: &str = "new-chat";

#[derive(Parser)]
#[command(name = "stream_console")]
#[command(about = "Consume admin console event streams from the command line", long_about = None)]
struct Cli {
    /// RON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,

    /// Overrides the backend base url from the config
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides the access token from the config
    #[arg(long)]
    token: Option<String>,

    /// Also log debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the assistant and stream the answer
    Chat {
        message: String,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Fetch the whole answer in one response
        #[arg(long)]
        no_stream: bool,
    },
    /// Follow processing of an uploaded file
    Process { filename: String },
    /// Follow a bulk audit job
    Audit { job_id: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    initialize(LogDestination::File(Path::new(LOG_FILENAME)), level);

    let mut config = config::load(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if cli.token.is_some() {
        config.token = cli.token;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(dispatch(cli.command, &config))?;

    Ok(match outcome {
        Some(Outcome::Done) | Some(Outcome::Cancelled) => ExitCode::SUCCESS,
        Some(other) => {
            eprintln!("{other}");
            ExitCode::FAILURE
        }
        None => ExitCode::FAILURE,
    })
}

async fn dispatch(command: Commands, config: &ConsoleConfig) -> Result<Option<Outcome>> {
    match command {
        Commands::Chat {
            message,
            conversation,
            no_stream,
        } => {
            let target = TargetId::new(conversation.as_deref().unwrap_or(NEW_CHAT_TARGET));
            let fallback = requests::chat_complete(&message, conversation.as_deref());
            let stream_request: effects::RequestFactory =
                Box::new(move |_: &TargetId| requests::chat_stream(&message, conversation.as_deref()));
            let job = Job {
                target,
                requests: stream_request,
                fallback: Some(fallback),
                stream: !no_stream,
                history_capacity: config.history_capacity,
            };
            app::run(controller::<Chat>(config, SessionSettings::for_chat())?, job).await
        }
        Commands::Process { filename } => {
            let job = Job {
                target: TargetId::new(filename),
                requests: Box::new(|target: &TargetId| requests::file_processing_stream(target.as_str())),
                fallback: None,
                stream: true,
                history_capacity: config.history_capacity,
            };
            app::run(
                controller::<FileProcessing>(config, SessionSettings::for_file_processing())?,
                job,
            )
            .await
        }
        Commands::Audit { job_id } => {
            let job = Job {
                target: TargetId::new(job_id),
                requests: Box::new(|target: &TargetId| requests::audit_stream(target.as_str())),
                fallback: None,
                stream: true,
                history_capacity: config.history_capacity,
            };
            app::run(controller::<Audit>(config, SessionSettings::for_audit())?, job).await
        }
    }
}

fn controller<V: Vocabulary>(
    config: &ConsoleConfig,
    preset: SessionSettings,
) -> Result<SessionController<V>> {
    let credentials = Arc::new(StaticCredentials::new(config.token.clone()));
    let transport = ReqwestTransport::new(&config.base_url, credentials, config.transport_settings())?;
    Ok(SessionController::new(
        Arc::new(transport),
        config.session_settings(preset),
    ))
}
