use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use litestore_bot::bot;
use litestore_bot::config::Config;
use litestore_bot::scheduler::ReconcileScheduler;
use litestore_bot::services::deposit_service::{DepositService, DepositSettings};
use litestore_bot::services::input_service::InputService;
use litestore_bot::services::notification_service::{GroupSink, NotificationService, TelegramGroupSink};
use litestore_bot::services::payment::orkut::OrkutGateway;
use litestore_bot::services::payment::saweria::SaweriaClient;
use litestore_bot::services::saweria_service::SaweriaService;
use litestore_bot::transport::{Messenger, TelegramMessenger};
use litestore_bot::AppState;
use litestore_db::{Ledger, PgLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,litestore_bot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LiteStore bot...");

    let config = Arc::new(Config::from_env()?);
    if !config.qris_configured() {
        warn!("QRIS merchant settings are incomplete, QRIS topups will fail");
    }

    let pool = litestore_db::db::init_db(&config.database_url).await?;
    let ledger: Arc<dyn Ledger> = Arc::new(PgLedger::new(pool));

    let bot = Bot::new(&config.bot_token);
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot.clone()));
    let group: Option<Arc<dyn GroupSink>> = config.ops_group.as_ref().map(|g| {
        Arc::new(TelegramGroupSink::new(
            config.telegram_api_url.clone(),
            g.token.clone(),
            g.chat_id.clone(),
        )) as Arc<dyn GroupSink>
    });
    let notifier = NotificationService::new(messenger.clone(), group, config.store_name.clone());

    let qris = Arc::new(OrkutGateway::new(
        config.qris_static_payload.clone(),
        config.qris_merchant_id.clone(),
        config.qris_api_key.clone(),
        config.qris_mutation_url.clone(),
        config.qris_render_url.clone(),
    ));
    let saweria_client = Arc::new(SaweriaClient::new(
        config.saweria_base_url.clone(),
        config.saweria_username.clone(),
        config.saweria_email.clone(),
    ));

    let expiry = chrono::Duration::seconds(config.deposit_expiry_secs);
    let deposits = DepositService::new(
        ledger.clone(),
        qris,
        notifier.clone(),
        DepositSettings {
            expiry,
            max_pending_per_user: config.max_pending_per_user,
            create_cooldown: Duration::from_millis(config.create_cooldown_ms),
        },
    );
    if let Err(e) = deposits.restore().await {
        error!("Failed to restore pending deposits: {}", e);
    }
    let saweria = SaweriaService::new(ledger.clone(), saweria_client, notifier.clone(), expiry);
    let input = InputService::new(messenger, ledger.clone(), deposits.clone(), saweria.clone());

    let state = AppState {
        config: config.clone(),
        ledger,
        deposits: deposits.clone(),
        saweria: saweria.clone(),
        input,
        notifier,
    };

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let loops = ReconcileScheduler::new(deposits, saweria, Duration::from_secs(config.poll_interval_secs))
        .spawn(&shutdown_tx);

    let bot_task = tokio::spawn(bot::run_bot(bot, shutdown_tx.subscribe(), state));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(());

    for handle in loops {
        let _ = handle.await;
    }
    let _ = bot_task.await;
    info!("LiteStore bot stopped");
    Ok(())
}
