//! `ChatVerse` demo binary.
//!
//! Seeds the demo world (Alice, Bob, Carol, David and a handful of
//! rooms) against the in-process backend, runs a short scripted session
//! as the configured user, and logs the resulting event stream.
//!
//! ```bash
//! cargo run --bin chatverse -- --username Bob --user-id 2
//! ```

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use chatverse::backend::local::{LocalBackend, LocalServer};
use chatverse::client::ChatClient;
use chatverse::config::{CliArgs, ClientConfig};
use chatverse::directory::{Room, RoomKind};
use chatverse::session::{SessionManager, User};
use chatverse_proto::id::UserId;
use chatverse_proto::message::MessageContent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("chatverse demo starting");

    let server = LocalServer::new();
    let rooms = seed_rooms();
    for room in &rooms {
        server.create_room(room);
    }

    // Alice is always present so the local user has someone to talk to.
    let alice_link = server.connect(UserId::new("1"), config.backend_buffer);

    let user = User::new(
        config.user_id.clone().unwrap_or_else(|| "2".to_string()),
        config.username.clone().unwrap_or_else(|| "Bob".to_string()),
        "🧑‍🎨",
    );
    let mut sessions = SessionManager::new();
    let handle = sessions.connect(user)?;
    let backend = server.connect(handle.user.id.clone(), config.backend_buffer);

    let (client, mut events) = ChatClient::new(backend, handle, &config);
    for room in rooms {
        client.add_room(room);
    }

    run_script(&client, &alice_link, &server).await?;

    while let Ok(event) = events.try_recv() {
        tracing::info!(?event, "client event");
    }

    sessions.disconnect();
    tracing::info!("chatverse demo exiting");
    Ok(())
}

/// The demo room layout: three open channels and one private room.
fn seed_rooms() -> Vec<Room> {
    let everyone = vec![
        UserId::new("1"),
        UserId::new("2"),
        UserId::new("3"),
        UserId::new("4"),
    ];
    vec![
        Room::new("general", "General", RoomKind::Public, everyone.clone()),
        Room::new("random", "Random", RoomKind::Public, everyone.clone()),
        Room::new("tech-talk", "Tech Talk", RoomKind::Public, everyone),
        Room::new(
            "private-alice",
            "Alice",
            RoomKind::Private,
            vec![UserId::new("1"), UserId::new("2")],
        ),
    ]
}

/// A short scripted session: typing, a message, a reaction, mark-read.
async fn run_script(
    client: &ChatClient<LocalBackend>,
    alice_link: &LocalBackend,
    server: &LocalServer,
) -> Result<(), Box<dyn std::error::Error>> {
    use chatverse_proto::frame::ClientFrame;
    use chatverse_proto::id::{CorrelationId, RoomId};

    let general = RoomId::new("general");

    client.start_typing(&general).await?;
    let (local_id, _) = client
        .send_message(&general, MessageContent::Text("Hey everyone! 👋".into()))
        .await?;
    tracing::info!(%local_id, "message sent optimistically");

    drain(client).await;

    // Alice reacts to whatever Bob's message became after confirmation.
    if let Some(tail) = client
        .list_messages(&general, None, None)
        .messages
        .last()
        .map(|m| m.id.clone())
    {
        use chatverse::backend::Backend as _;
        alice_link
            .send(ClientFrame::ReactionToggle {
                message_id: tail,
                emoji: "👍".to_string(),
                correlation_id: CorrelationId::new(),
            })
            .await?;
    }
    drain(client).await;

    client.mark_read(&general)?;
    let room = client.select_room(&general)?;
    tracing::info!(room = %room.id, unread = room.unread, "room state after script");

    // Alice leaves; her offline presence flows to the local user.
    server.disconnect(alice_link.user());
    drain(client).await;

    Ok(())
}

/// Applies inbound frames until the stream goes quiet.
async fn drain(client: &ChatClient<LocalBackend>) {
    while let Ok(result) = tokio::time::timeout(Duration::from_millis(50), client.process_one()).await
    {
        if let Err(e) = result {
            tracing::warn!(error = %e, "frame processing stopped");
            break;
        }
    }
}

/// Initialize logging to stderr, or to a file when `--log-file` is set.
///
/// An unusable `--log-file` path is reported and logging falls back to
/// stderr rather than being silently disabled.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so
/// buffered entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if let Some(log_path) = file_path {
        if let Some((log_dir, file_name)) = split_log_path(log_path) {
            let file_appender = tracing_appender::rolling::never(log_dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_writer(non_blocking)
                .with_env_filter(env_filter)
                .with_ansi(false)
                .init();
            return Some(guard);
        }
        eprintln!(
            "Warning: unusable log file path {}, logging to stderr",
            log_path.display()
        );
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();
    None
}

/// Splits a log path into its directory and UTF-8 file name. A bare
/// file name maps to the current directory.
fn split_log_path(path: &Path) -> Option<(&Path, &str)> {
    let dir = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return None,
    };
    let file = path.file_name()?.to_str()?;
    Some((dir, file))
}
