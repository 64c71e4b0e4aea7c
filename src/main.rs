use overlay_coordinator::isolation::{load_baseline, IsolationConfig, IsolationForest};
use overlay_coordinator::{api, constants, Classifier, Coordinator, CoordinatorConfig, Listener, Result, SharedKey};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    let result = match cmd {
        "serve" => serve().await,
        "keygen" => {
            println!("{}", SharedKey::generate().to_base64());
            Ok(())
        }
        _ => {
            println!("{} — доступные команды:", constants::SERVICE_NAME);
            println!("  serve   — запустить координатор (по умолчанию)");
            println!("  keygen  — новый ключ для COORDINATOR_KEY (base64)");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn serve() -> Result<()> {
    constants::print_banner();
    let config = CoordinatorConfig::from_env()?;
    let key = SharedKey::from_env()?;
    log::info!("🔐 Shared key loaded ({} bits)", key.bits());

    let coordinator = Arc::new(Coordinator::new(config.clone(), &key)?.with_classifier(build_classifier(&config)?));
    let shutdown = CancellationToken::new();
    let listener = Listener::bind(config.listen_addr, Arc::clone(&coordinator)).await?;

    if let Some(api_addr) = config.api_addr {
        let (coordinator, shutdown) = (Arc::clone(&coordinator), shutdown.clone());
        tokio::spawn(async move {
            if let Err(e) = api::serve(api_addr, coordinator, shutdown).await {
                log::error!("❌ Status API stopped: {}", e);
            }
        });
    }

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("🛑 Shutdown signal received");
            signal.cancel();
        }
    });

    listener.run(shutdown).await
}

fn build_classifier(config: &CoordinatorConfig) -> Result<Classifier> {
    let mut forest = IsolationForest::new(IsolationConfig {
        contamination: config.contamination,
        ..IsolationConfig::default()
    });
    match &config.baseline_path {
        Some(path) => {
            let baseline = load_baseline(path)?;
            forest.fit(baseline.view())?;
        }
        None => log::warn!("⚠️ No baseline configured, every message will be classified normal"),
    }
    Ok(Classifier::from_scorer(forest))
}
