//! Lending protocol liquidation bot
//!
//! Runs liquidation cycles against one deployment:
//! - Batched Multicall3 reads of reserves, positions and provider capital
//! - Borrow-token selection and exact U256 sizing
//! - Uniswap V3 route discovery (direct and through the base asset)
//! - Simulate / re-check / submit retry search per user
//!
//! Usage: `liqbot [--once]`. `DEPLOYMENT` names the deployment TOML,
//! `BOT_PROFILE` the bot profile (or `BOT_CONFIG` a TOML file).

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liqbot_api::{
    BorrowerSource, FileBorrowerSource, HttpBorrowerSource, StaticBorrowerSource,
    UniswapV3RouteFinder,
};
use liqbot_chain::{LendingPoolReader, Multicall3Reader, ProviderManager, TransactionSenderBuilder};
use liqbot_core::{
    load_deployment_from_env, BorrowerFeed, BotConfig, ContractExecutor, Journal,
    LiquidationPipeline, Liquidator, PipelineSettings, ResolvedDeployment,
};

/// Environment variable names.
mod env {
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const BOT_CONFIG: &str = "BOT_CONFIG";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let once = std::env::args().any(|arg| arg == "--once");

    // BOT_CONFIG (TOML file) wins over BOT_PROFILE
    let bot_config = match std::env::var(env::BOT_CONFIG) {
        Ok(path) => BotConfig::from_file(&path)
            .with_context(|| format!("failed to load bot config {path}"))?,
        Err(_) => BotConfig::from_env(),
    };
    bot_config.log_config();

    let deployment = load_deployment_from_env()?;
    deployment.log();

    let (pipeline, borrowers) = initialize_components(&deployment, &bot_config).await?;

    if once {
        let list = borrowers.fetch_borrowers().await?;
        let report = pipeline.run_cycle(&list).await?;
        info!(?report, "Single cycle finished");
        return Ok(());
    }

    let mut interval = tokio::time::interval(bot_config.cycle.cycle_interval());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(
        interval_secs = bot_config.cycle.cycle_interval_secs,
        source = borrowers.source_id(),
        "Starting liquidation loop"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }

        let list = match borrowers.fetch_borrowers().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Borrower feed unavailable, skipping cycle");
                continue;
            }
        };

        if let Err(e) = pipeline.run_cycle(&list).await {
            error!(error = %e, "Cycle aborted");
        }
    }
}

/// Human-readable logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,liqbot_core=debug,liqbot_chain=debug"));
    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

async fn initialize_components(
    deployment: &ResolvedDeployment,
    bot_config: &BotConfig,
) -> Result<(LiquidationPipeline, Box<dyn BorrowerSource>)> {
    info!("Initializing components...");
    let contracts = deployment.contracts;

    // Provider manager
    let provider = ProviderManager::new(&deployment.rpc_url).await?;
    if provider.chain_id() != deployment.chain_id {
        anyhow::bail!(
            "RPC chain id {} does not match deployment chain id {}",
            provider.chain_id(),
            deployment.chain_id
        );
    }

    // Batched reads
    let reader = Arc::new(Multicall3Reader::new(&deployment.rpc_url, contracts.multicall));
    info!(multicall = %reader.address(), "Batch reader initialized");
    let pool = LendingPoolReader::new(reader.clone(), contracts.lending_pool)
        .with_batch_size(bot_config.reader.multicall_batch_size);

    // Route discovery
    let routes = Arc::new(
        UniswapV3RouteFinder::new(
            reader,
            contracts.uniswap_factory,
            contracts.uniswap_quoter,
            contracts.base_asset,
        )
        .with_fee_tiers(&bot_config.reader.fee_tiers),
    );

    // Transaction sender
    let private_key = std::env::var(env::PRIVATE_KEY)
        .map_err(|_| anyhow::anyhow!("Missing env var: {}", env::PRIVATE_KEY))?;
    let sender = Arc::new(
        match bot_config.execution.gas_limit {
            Some(limit) => TransactionSenderBuilder::new(&deployment.rpc_url, deployment.chain_id)
                .gas_limit(limit),
            None => TransactionSenderBuilder::new(&deployment.rpc_url, deployment.chain_id),
        }
        .build(&private_key)?,
    );
    match sender.get_balance().await {
        Ok(balance) => info!(address = %sender.address, %balance, "Transaction sender initialized"),
        Err(e) => warn!(address = %sender.address, error = %e, "Could not read sender balance"),
    }

    // Execution loop
    let liquidator = Liquidator::new(
        Arc::new(ContractExecutor::new(sender, contracts.liquidation_bot)),
        Arc::new(pool.clone()),
        bot_config.execution.settings(),
    );

    let mut pipeline = LiquidationPipeline::new(
        pool,
        routes,
        liquidator,
        contracts,
        PipelineSettings {
            chain_id: deployment.chain_id,
            policy: bot_config.policy.clone(),
        },
    );
    if let Some(path) = &bot_config.cycle.journal_path {
        let journal = Journal::new(path);
        info!(path = %journal.path().display(), "Liquidation journal enabled");
        pipeline = pipeline.with_journal(journal);
    }

    // Borrower feed
    let borrowers: Box<dyn BorrowerSource> = match &deployment.borrowers {
        BorrowerFeed::Http(url) => Box::new(HttpBorrowerSource::new(url.clone())),
        BorrowerFeed::File(path) => Box::new(FileBorrowerSource::new(path)),
        BorrowerFeed::Env => Box::new(StaticBorrowerSource::from_env()?),
    };

    info!(source = borrowers.source_id(), "All components initialized");
    Ok((pipeline, borrowers))
}
