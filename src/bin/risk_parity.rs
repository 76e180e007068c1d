use tracing::{error, info};

use portfolio_toolkit::{
    core::{ReturnMatrix, RiskParitySolver},
    logging,
    services::{fetch_price_histories, DriftReport, GatewayClient, HistoryWindow},
    Allocation, Result, ToolkitConfig,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ToolkitConfig::from_env()?;
    let client = GatewayClient::new(&config.gateway)?;
    client.ensure_authenticated().await?;

    let window = HistoryWindow::new(config.history_period.clone(), config.history_bar.clone());
    info!(
        symbols = %config.symbols().join(","),
        period = %window.period,
        bar = %window.bar,
        "downloading price history"
    );
    let series = fetch_price_histories(&client, &config.instruments, &window).await?;
    let returns = ReturnMatrix::from_series(&series)?;
    info!(periods = returns.periods(), assets = returns.assets(), "return matrix ready");

    let allocation = RiskParitySolver::default().solve(&returns)?;
    print_allocation(&allocation);

    if let Some(account_id) = config.account_id.as_deref() {
        let positions = client.positions(account_id).await?;
        let report = DriftReport::build(
            &allocation,
            &config.instruments,
            &positions,
            config.drift_threshold_pct,
        )?;
        print_drift(&report);
    }
    Ok(())
}

fn print_allocation(allocation: &Allocation) {
    let rule = "=".repeat(60);
    println!("{}", rule);
    println!("RISK PARITY PORTFOLIO ALLOCATION");
    println!("{}", rule);
    for (symbol, weight) in allocation.symbols.iter().zip(&allocation.weights) {
        println!("{:8} {:6.2}%", symbol, weight * 100.0);
    }
    println!("{}", rule);
    println!("Total:   {:6.2}%", allocation.total_weight() * 100.0);
    println!();
    println!("Risk Contributions:");
    for (symbol, rc) in allocation.symbols.iter().zip(&allocation.risk_contributions) {
        println!("{:8} {:6.2}%", symbol, rc * 100.0);
    }
}

fn print_drift(report: &DriftReport) {
    println!();
    println!(
        "Current vs target (total value {:.2}, threshold {:.1}%):",
        report.total_value, report.threshold_pct
    );
    for e in &report.entries {
        let flag = if e.breached {
            format!("  -> {} ~{:.0}", e.direction(), e.dollar.abs())
        } else {
            String::new()
        };
        println!(
            "{:8} actual {:6.2}%  target {:6.2}%  diff {:+6.2}%{}",
            e.symbol, e.actual_pct, e.target_pct, e.diff_pct, flag
        );
    }
    if report.breaches().next().is_none() {
        println!("All positions within {:.1}% tolerance", report.threshold_pct);
    }
}
