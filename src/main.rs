use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use teloxide::prelude::*;
use tokio::time::sleep;

use spysok::core::{config, init_logger};
use spysok::flow::FlowRegistry;
use spysok::pagination::SessionManager;
use spysok::storage::create_pool;
use spysok::telegram::{create_bot, schema, HandlerDeps};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_logger(&config::LOG_FILE_PATH)?;

    if config::BOT_TOKEN.is_empty() {
        anyhow::bail!("BOT_TOKEN is not set");
    }
    if *config::ADMIN_ID == 0 {
        anyhow::bail!("ADMIN_ID is not set");
    }

    run_bot().await
}

async fn run_bot() -> Result<()> {
    log::info!("Starting bot...");

    // Pool creation also migrates the schema on the first connection
    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);

    let bot = create_bot();
    let deps = HandlerDeps::new(
        db_pool,
        Arc::new(SessionManager::new(
            *config::pagination::PAGE_SIZE,
            *config::pagination::SESSION_TTL,
        )),
        Arc::new(FlowRegistry::new()),
        *config::ADMIN_ID,
    );
    let handler = schema(deps);

    // Run the dispatcher in a separate task so panics are caught via the
    // JoinHandle; the loop notifies the admin and reconnects indefinitely.
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        let handle = tokio::spawn(async move {
            Dispatcher::builder(bot_clone, handler_clone)
                .dependencies(DependencyMap::new())
                .enable_ctrlc_handler()
                .build()
                .dispatch()
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) => {
                if !join_err.is_panic() {
                    log::warn!("Dispatcher task was cancelled: {}", join_err);
                    break;
                }
                log::error!("Dispatcher panicked: {}", join_err);
                let _ = bot
                    .send_message(ChatId(*config::ADMIN_ID), "❌ Бот впав, перезапускаюсь...")
                    .await;
                sleep(config::retry::dispatcher_delay()).await;
                log::info!("Restarting dispatcher...");
            }
        }
    }

    Ok(())
}
