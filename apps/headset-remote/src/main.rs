use clap::Parser;
use headset_remote::cli::{self, Cli};

#[tokio::main]
async fn main() {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli).await {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}
