//! Prints the market state, a few quotes and the top gainers.
//!
//! ```text
//! RUST_LOG=nsetick_core=debug cargo run -p nsetick-core --example market_snapshot -- INFY TCS
//! ```

use std::env;

use nsetick_core::{NseClientBuilder, TopList};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nsetick_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut codes: Vec<String> = env::args().skip(1).collect();
    if codes.is_empty() {
        codes = vec![String::from("INFY"), String::from("TCS")];
    }

    let client = NseClientBuilder::from_env()?.build();
    tracing::info!(%client, "client ready");

    match client.is_market_open().await {
        Ok(open) => println!("market open: {open}"),
        Err(error) => println!("market state unavailable: {error}"),
    }

    if let Some(batch) = client.quotes(&codes, false).await?.native() {
        for (code, quote) in codes.iter().zip(&batch.quotes) {
            match quote {
                Some(quote) => println!(
                    "{code:>12} last={:?} close={:?}",
                    quote.get_f64("lastPrice"),
                    quote.get_f64("closePrice")
                ),
                None => println!("{code:>12} unavailable"),
            }
        }
        for failure in &batch.failures {
            println!("{:>12} failed: {}", failure.symbol, failure.error);
        }
    }

    let gainers = client.top(TopList::Gainers, true).await?;
    if let Some(json) = gainers.json() {
        println!("top gainers: {json}");
    }

    println!("state: {:?}", client.market_state());
    Ok(())
}
