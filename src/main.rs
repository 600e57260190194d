//! ordkit - ordinal-aware PSBT construction CLI

use anyhow::Result;
use clap::Parser;

use ordkit::commands::*;

#[derive(Parser, Debug)]
#[command(name="ordkit", about="Ordinal-aware PSBT builder: balances, transfers, inscriptions and instant trades")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Classify a wallet's UTXOs into spendable and inscription-bearing sets
    Balance(BalanceOpts),
    /// Build a transfer PSBT from wallet UTXOs
    Send(SendOpts),
    /// Build a PSBT that creates dummy UTXOs for instant trades
    Dummies(DummiesOpts),
    /// List an inscription: build the seller's SINGLE|ANYONECANPAY PSBT
    Sell(SellOpts),
    /// Complete a seller PSBT into a buyer PSBT
    Buy(BuyOpts),
    /// Compile an inscription: commit address, then reveal PSBT
    Inscribe(InscribeOpts),
    /// Publish a collection as an inscription
    Publish(PublishOpts),
    /// Authorize and inscribe a collection mint
    Mint(MintOpts),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Balance(o) => run_balance(o),
        Commands::Send(o) => run_send(o),
        Commands::Dummies(o) => run_dummies(o),
        Commands::Sell(o) => run_sell(o),
        Commands::Buy(o) => run_buy(o),
        Commands::Inscribe(o) => run_inscribe(o),
        Commands::Publish(o) => run_publish(o),
        Commands::Mint(o) => run_mint(o),
    }
}
