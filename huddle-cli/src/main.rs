use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Input, Select};
use huddle_client::{
    CallState, ConnectionState, FailureRecovery, MediaConstraints, RemoteTrack, SessionConfig,
    SessionController, SessionError, SessionHandle, SessionObserver, SessionSnapshot,
    TransportConfig, WebrtcBackend, WsConnector,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "huddle", version, about = "Join a huddle room from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room and drive the call interactively.
    Join {
        #[arg(short, long)]
        room: String,

        /// Prompted for when omitted.
        #[arg(short, long)]
        username: Option<String>,

        /// Relay URL, overrides HUDDLE_SERVER_URL.
        #[arg(short, long)]
        server: Option<String>,

        #[arg(long, default_value_t = false)]
        no_audio: bool,

        #[arg(long, default_value_t = false)]
        no_video: bool,

        /// STUN server, repeatable. Overrides HUDDLE_STUN_URLS.
        #[arg(long = "stun")]
        stun: Vec<String>,

        /// Connection timeout in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Fail instead of creating the room when it does not exist.
        #[arg(long, default_value_t = false)]
        no_create: bool,

        /// Recover a failed peer by renegotiating instead of rejoining.
        #[arg(long, default_value_t = false)]
        renegotiate: bool,

        /// Start a call as soon as the room is joined.
        #[arg(long, default_value_t = false)]
        call: bool,
    },
}

#[derive(Debug, Clone, Copy)]
enum MenuAction {
    Call,
    HangUp,
    Status,
    Rejoin,
    Quit,
}

const MENU: [(&str, MenuAction); 5] = [
    ("📞 Start call", MenuAction::Call),
    ("🔕 Hang up", MenuAction::HangUp),
    ("📋 Status", MenuAction::Status),
    ("🔄 Rejoin", MenuAction::Rejoin),
    ("🚪 Quit", MenuAction::Quit),
];

struct CliObserver;

#[async_trait]
impl SessionObserver for CliObserver {
    async fn on_state_changed(&self, state: ConnectionState) {
        println!("{} {}", "●".blue(), state.to_string().blue().bold());
    }

    async fn on_members_changed(&self, members: &[String]) {
        if members.is_empty() {
            println!("{}", "👤 You are alone in the room".dimmed());
        } else {
            println!("{} {}", "👥 Members:".cyan(), members.join(", ").bold());
        }
    }

    async fn on_call_started(&self, initiator: &str) {
        println!("{} {}", "📞 Call started by".green(), initiator.bold());
    }

    async fn on_remote_track(&self, peer: &str, track: &RemoteTrack) {
        println!(
            "{} {:?} track {} from {}",
            "🎧".green(),
            track.kind,
            track.id,
            peer.bold()
        );
    }

    async fn on_peer_left(&self, peer: &str) {
        println!("{} {}", "👋 Left:".yellow(), peer.bold());
    }

    async fn on_call_ended(&self, peer: &str) {
        println!("{} {}", "🔕 Call ended with".yellow(), peer.bold());
    }

    async fn on_error(&self, error: &SessionError) {
        eprintln!("{} {}", "❌".red(), error.to_string().red());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Join {
            room,
            username,
            server,
            no_audio,
            no_video,
            stun,
            timeout_ms,
            no_create,
            renegotiate,
            call,
        } => {
            let username = match username {
                Some(name) => name,
                None => prompt_username().await?,
            };

            let mut config = SessionConfig::from_env()
                .with_media(MediaConstraints {
                    audio: !no_audio,
                    video: !no_video,
                })
                .with_create_room(!no_create);
            if let Some(url) = server {
                config.endpoint = url;
            }
            if let Some(ms) = timeout_ms {
                config = config.with_connect_timeout(Duration::from_millis(ms));
            }
            if renegotiate {
                config = config.with_failure_recovery(FailureRecovery::RenegotiatePeer);
            }

            let transport = if stun.is_empty() {
                TransportConfig::from_env()
            } else {
                TransportConfig::with_stun_urls(stun)
            };

            println!(
                "{} {} {}",
                "🚀 Connecting to".green().bold(),
                config.endpoint.bold(),
                format!("as {}", username).dimmed()
            );

            let controller = SessionController::new(
                config,
                Arc::new(WsConnector::new()),
                Arc::new(WebrtcBackend::new(transport)),
                Arc::new(CliObserver),
            );
            let handle = controller.spawn();

            handle
                .join_room(room.clone(), username.clone())
                .await
                .with_context(|| format!("Failed to join room '{}'", room))?;
            println!("{} {}", "✅ Joined".green().bold(), room.bold());

            if call {
                start_call(&handle).await;
            }

            interact(&handle, &room, &username).await?;
        }
    }

    Ok(())
}

async fn prompt_username() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
    })
    .await
    .context("Username prompt panicked")?
    .context("Failed to read username")
}

async fn interact(handle: &SessionHandle, room: &str, username: &str) -> Result<()> {
    loop {
        let choice = tokio::task::spawn_blocking(|| {
            let labels: Vec<&str> = MENU.iter().map(|(label, _)| *label).collect();
            Select::new()
                .with_prompt("huddle")
                .items(&labels)
                .default(0)
                .interact()
        })
        .await
        .context("Menu prompt panicked")?
        .context("Failed to read menu choice")?;

        match MENU[choice].1 {
            MenuAction::Call => start_call(handle).await,
            MenuAction::HangUp => {
                handle.end_call().await?;
            }
            MenuAction::Status => {
                let snapshot = handle.snapshot().await?;
                print_status(&snapshot);
            }
            MenuAction::Rejoin => {
                handle.leave_room().await?;
                match handle.join_room(room, username).await {
                    Ok(()) => println!("{} {}", "✅ Rejoined".green().bold(), room.bold()),
                    Err(e) => eprintln!("{} {}", "❌".red(), e.to_string().red()),
                }
            }
            MenuAction::Quit => {
                handle.leave_room().await?;
                println!("{}", "👋 Bye".green());
                return Ok(());
            }
        }
    }
}

async fn start_call(handle: &SessionHandle) {
    match handle.start_call().await {
        Ok(()) => println!("{}", "📞 Calling...".green()),
        Err(e) => eprintln!("{} {}", "❌".red(), e.to_string().red()),
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    println!("{} {}", "State:".cyan(), snapshot.state);
    if let (Some(room), Some(username)) = (&snapshot.room, &snapshot.username) {
        println!("{} {} as {}", "Room:".cyan(), room.bold(), username.bold());
    }

    let call = match snapshot.call {
        CallState::Idle => "idle".to_owned(),
        CallState::Active { initiator: true } => "active (initiator)".to_owned(),
        CallState::Active { initiator: false } => "active".to_owned(),
    };
    println!("{} {}", "Call:".cyan(), call);
    println!(
        "{} {}",
        "Local media:".cyan(),
        if snapshot.has_local_media { "captured" } else { "none" }
    );

    if snapshot.members.is_empty() {
        println!("{}", "No other members".dimmed());
    }
    for member in &snapshot.members {
        let state = snapshot
            .negotiations
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, state)| state.to_string())
            .unwrap_or_else(|| "-".to_owned());
        println!("  {} {}", member.bold(), state.dimmed());
    }
}
