use tracing::error;

use portfolio_toolkit::{logging, services::GatewayClient, Result, ToolkitConfig};

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

    let results = client.search_many(&config.symbols()).await?;

    println!("{}", "=".repeat(70));
    println!("CONTRACT SEARCH RESULTS");
    println!("{}", "=".repeat(70));
    for (symbol, matches) in &results {
        println!("\n{}:", symbol);
        if matches.is_empty() {
            println!("  no match");
            continue;
        }
        for (idx, m) in matches.iter().enumerate() {
            println!(
                "  [{}] Conid: {} | Exchange: {} | {} | {}",
                idx + 1,
                m.conid,
                m.listing_exchange.as_deref().or(m.description.as_deref()).unwrap_or("-"),
                m.name.as_deref().unwrap_or("-"),
                m.sec_type.as_deref().unwrap_or("-"),
            );
        }
    }

    println!("\n{}", "=".repeat(70));
    println!("RECOMMENDED conids (first listing):");
    println!("{}", "=".repeat(70));
    for (symbol, matches) in &results {
        match matches.first() {
            Some(m) => println!("{}={}", symbol, m.conid),
            None => println!("{}: no match", symbol),
        }
    }
    Ok(())
}
