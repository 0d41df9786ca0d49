use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use chat_sync::console::{Console, HELP};
use chat_sync::{Config, ConversationStore, FileStore, HttpChatService, ReviewBoard, StateRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Logs go to stderr so the conversation on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_sync=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    // ── Persistence ──────────────────────────────────────────────────────────
    let repository = StateRepository::new(Arc::new(FileStore::new(&config.state_dir)));
    let user_id = repository.user_id().await?;
    info!("State directory {} (user {user_id})", config.state_dir.display());

    // ── Dependency wiring ────────────────────────────────────────────────────
    let service = Arc::new(HttpChatService::new(
        &config.api_base_url,
        user_id.clone(),
        config.request_timeout,
    )?);
    let store = ConversationStore::new(service.clone(), repository.clone());
    let reviews = ReviewBoard::new(service, repository, user_id);

    store.load_from_persistence().await?;
    if let Err(e) = reviews.refresh().await {
        tracing::warn!("Could not load reviews: {e}");
    }
    info!("Connected to {}", config.api_base_url);

    let console = Console::new(store, reviews);
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{HELP}\n").as_bytes()).await?;

    // ── Read-eval-print loop ─────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let reply = console.handle_line(&line).await;
        for out in &reply.lines {
            stdout.write_all(format!("{out}\n").as_bytes()).await?;
        }
        if reply.quit {
            break;
        }
    }

    Ok(())
}
