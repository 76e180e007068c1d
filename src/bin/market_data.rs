use std::time::Duration;

use tracing::{error, warn};

use portfolio_toolkit::{
    logging,
    services::GatewayClient,
    Quote, Result, ToolkitConfig, ToolkitError,
};

const PREFLIGHT_SETTLE: Duration = Duration::from_secs(1);

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

    let quotes = client
        .snapshot_with_preflight(&config.conids(), PREFLIGHT_SETTLE)
        .await?;

    println!("{}", "=".repeat(70));
    println!("MARKET DATA SNAPSHOT");
    println!("{}", "=".repeat(70));
    for instrument in &config.instruments {
        match quotes.iter().find(|q| q.conid == instrument.conid) {
            Some(quote) => print_quote(&instrument.symbol, quote),
            None => println!("{} (conid {}): no snapshot returned\n", instrument.symbol, instrument.conid),
        }
    }

    println!("{}", "=".repeat(70));
    println!("LATEST PRICE (snapshot, then recent history)");
    println!("{}", "=".repeat(70));
    for instrument in &config.instruments {
        match client.latest_price(instrument).await {
            Ok(Some(price)) => println!("{:8} {:>12.4}", instrument.symbol, price),
            Ok(None) => println!("{:8} {:>12}", instrument.symbol, "n/a"),
            Err(e @ ToolkitError::Connection(_)) => return Err(e),
            Err(e) => {
                warn!(symbol = %instrument.symbol, "latest price unavailable: {}", e);
                println!("{:8} {:>12}", instrument.symbol, "n/a");
            }
        }
    }
    Ok(())
}

fn print_quote(symbol: &str, quote: &Quote) {
    let show = |v: Option<f64>| v.map(|x| format!("{}", x)).unwrap_or_else(|| "n/a".to_string());
    println!("{} (conid {}):", quote.symbol.as_deref().unwrap_or(symbol), quote.conid);
    println!("  Last Price: {}", show(quote.last));
    println!("  Bid: {} (size: {})", show(quote.bid), show(quote.bid_size));
    println!("  Ask: {} (size: {})", show(quote.ask), show(quote.ask_size));
    println!("  Volume: {}\n", show(quote.volume));
}
