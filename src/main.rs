use clap::Parser;
use equip_recon::core::eligibility::NO_OPTIONS_MESSAGE;
use equip_recon::utils::error::ErrorSeverity;
use equip_recon::utils::{logger, validation::Validate};
use equip_recon::{
    CliConfig, EngineRules, HttpBackend, LocalDraftStore, ReconError, ReconciliationSession,
    ValidationMode,
};

#[tokio::main]
async fn main() {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting equip-recon CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = run(config).await {
        tracing::error!(
            "❌ Reconciliation failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run(config: CliConfig) -> Result<(), ReconError> {
    config.validate()?;

    let rules = match &config.rules_file {
        Some(path) => {
            tracing::info!("📋 Loading rules from {}", path);
            EngineRules::from_file(path)?
        }
        None => EngineRules::default(),
    };
    rules.validate()?;

    let backend = HttpBackend::new(&config.endpoint)?;
    let store = LocalDraftStore::new(config.draft_dir.clone());
    let mut session =
        ReconciliationSession::open(backend, store, config.work_context()?, rules).await?;

    println!("Work order {} ({})", session.context().work_order_id, session.context().work_type);
    println!("{:<12} {:<6} {:<8} {:<14} UNIT", "SLOT", "CAT", "MODEL", "NAME");
    for view in session.slot_views() {
        let unit = match (&view.unit, &view.stale_unit) {
            (Some(unit), _) => format!("{} [{}]", unit.id, unit.model),
            (None, Some(stale)) => format!("(stale: {})", stale),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:<12} {:<6} {:<8} {:<14} {}",
            view.slot.id, view.slot.category, view.slot.required_model, view.slot.display_name, unit
        );
    }

    let candidates: Vec<_> = session.candidates().into_iter().cloned().collect();
    println!("\nStock candidates: {}", candidates.len());
    for unit in &candidates {
        let options = session.lending_options(&unit.id)?;
        let lending = if options.is_empty() {
            NO_OPTIONS_MESSAGE.to_string()
        } else {
            options.codes().join(", ")
        };
        println!("  {} {}/{} lending: {}", unit.id, unit.category, unit.model, lending);
    }

    let violations = session.violations();
    if violations.is_empty() {
        println!("\n✅ Composition is valid");
    } else {
        println!("\n⚠️ {} problem(s):", violations.len());
        for violation in &violations {
            println!("  - {}", violation);
        }
    }

    if config.commit {
        session.validate(ValidationMode::FailFast)?;
        let receipt = session.commit().await?;
        println!(
            "✅ Committed: {}",
            receipt.message.unwrap_or_else(|| "work order completed".to_string())
        );
    }

    Ok(())
}
