//! Palaver application binary - composition root.
//!
//! Ties the Palaver crates into a local console:
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Register the session user and open their topic history
//! 3. Build the command registry and conversation engine
//! 4. Start the heartbeat loop
//! 5. Read chat lines from stdin until EOF or Ctrl-C

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use palaver_chat::{
    default_registry, random_seed_word, ChatError, ConversationEngine, EchoCompletion,
    EngineSettings, TopicStore,
};
use palaver_core::PalaverConfig;
use palaver_storage::{JsonFileBackend, UserRegistry};

use cli::CliArgs;

/// Write the current local time into the heartbeat file.
async fn touch_heartbeat(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let stamp = chrono::Local::now().naive_local().to_string();
    tokio::fs::write(path, stamp).await
}

/// Touch the heartbeat file on a fixed interval.
async fn heartbeat_loop(path: PathBuf, interval_secs: u64) {
    tracing::info!(interval_secs, path = %path.display(), "Heartbeat loop started");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        if let Err(e) = touch_heartbeat(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "Heartbeat write failed");
        }
    }
}

/// Format an engine result for the console.
fn render(result: Result<String, ChatError>) -> String {
    match result {
        Ok(reply) => reply,
        Err(e) => format!("error[{}]: {}", e.kind(), e),
    }
}

/// Feed stdin lines to the engine until EOF.
async fn repl(engine: Arc<Mutex<ConversationEngine>>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = {
            let mut engine = engine.lock().await;
            render(engine.handle(&line))
        };
        println!("{reply}");
    }
    tracing::info!("Input closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can seed the filter.
    let config_file = args.resolve_config_path();
    let loaded = PalaverConfig::load(&config_file);
    let level = args
        .resolve_log_level()
        .or_else(|| loaded.as_ref().ok().map(|c| c.general.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());

    // Tracing. Console replies go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Palaver v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults");
            PalaverConfig::default()
        }
    };
    if let Some(data_dir) = args.resolve_data_dir() {
        config.general.data_dir = data_dir;
    }
    config.general.log_level = level;
    config.validate()?;

    // Storage.
    let data_dir = config.data_dir();
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }

    let mut users = UserRegistry::open_in(&data_dir)?;
    let user = users.add_user(&args.user, args.resolve_username())?;
    tracing::info!(user_id = %user.user_id, username = %user.username, "Session user ready");

    let backend = JsonFileBackend::for_user(&data_dir, &args.user);
    tracing::info!(path = %backend.path().display(), "Topic history opened");
    let topics = TopicStore::load(Box::new(backend), random_seed_word())?;

    // Engine.
    let registry = Arc::new(default_registry());
    tracing::info!(commands = registry.len(), "Command registry built");
    let engine = Arc::new(Mutex::new(ConversationEngine::new(
        registry,
        topics,
        config.query.clone(),
        config.models.clone(),
        EngineSettings::from(&config.chat),
        Box::new(EchoCompletion),
    )));

    // === Background tasks ===

    if config.heartbeat.enabled && !args.no_heartbeat {
        let path = config.heartbeat_path();
        let interval_secs = config.heartbeat.interval_secs;
        tokio::spawn(async move {
            heartbeat_loop(path, interval_secs).await;
        });
    }

    // === Console ===

    println!("Palaver ready. Type /help for commands.");
    tokio::select! {
        result = repl(Arc::clone(&engine)) => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupted, shutting down");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_ok_passes_reply_through() {
        assert_eq!(render(Ok("Active topic: General".to_string())), "Active topic: General");
    }

    #[test]
    fn test_render_error_shows_kind() {
        let err = ChatError::Validation("temperature must be within [0, 1], got 2".to_string());
        assert_eq!(
            render(Err(err)),
            "error[validation]: invalid value: temperature must be within [0, 1], got 2"
        );
    }

    #[tokio::test]
    async fn test_touch_heartbeat_creates_parent_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartbeat").join("palaver_last_alive");
        touch_heartbeat(&path).await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(!first.is_empty());

        touch_heartbeat(&path).await.unwrap();
        assert!(path.exists());
    }
}
