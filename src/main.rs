use std::sync::Arc;

use mova_guard::channels::{ChatGateway, TelegramChannel};
use mova_guard::config::{GatewayConfig, ModeratorConfig, providers_from_env};
use mova_guard::error::Result;
use mova_guard::llm::create_providers;
use mova_guard::pipeline::{ClassifierGovernor, DecisionEngine};
use mova_guard::store::VocabularyCache;

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; real env vars still apply.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ModeratorConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let gateway_config = GatewayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC...");
        std::process::exit(1);
    });
    let provider_configs = providers_from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // ── Vocabulary ──────────────────────────────────────────────────────
    let vocabulary =
        Arc::new(VocabularyCache::load(&config.whitelist_path, config.min_word_chars).await?);

    // ── Classifier ──────────────────────────────────────────────────────
    let providers = create_providers(&provider_configs)?;
    let governor = Arc::new(ClassifierGovernor::new(
        providers,
        config.max_concurrent_classifications,
        config.system_prompt.clone(),
    ));

    eprintln!("🛡️  Mova Guard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Whitelist: {} ({} words)",
        config.whitelist_path.display(),
        vocabulary.len()
    );
    eprintln!("   Providers: {}", governor.provider_names().join(" → "));
    eprintln!("   Max concurrent classifications: {}", governor.max_concurrent());

    // ── Gateway ─────────────────────────────────────────────────────────
    let gateway: Arc<dyn ChatGateway> = Arc::new(TelegramChannel::new(gateway_config.bot_token));
    gateway.health_check().await?;
    let events = gateway.start().await?;

    let engine = Arc::new(DecisionEngine::new(
        &config,
        vocabulary,
        governor,
        Arc::clone(&gateway),
    ));

    tracing::info!(gateway = gateway.name(), "Mova Guard ready and listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Ctrl+C received, shutting down...");
    };
    Arc::clone(&engine).serve(events, shutdown).await;

    let stats = engine.governor().stats();
    tracing::info!(
        calls = stats.calls,
        provider_failures = stats.provider_failures,
        indeterminate = stats.indeterminate,
        peak_in_flight = stats.peak_in_flight,
        "Classifier totals"
    );

    Ok(())
}
