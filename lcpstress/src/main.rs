use clap::Parser;
use lcpstress::{Args, Config, StressError, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args)?;

    telemetry::init_telemetry()?;

    match lcpstress::run(&config).await {
        Ok(report) => {
            println!("{report}");
            Ok(())
        }
        // reported, not propagated: a missing url is a usage problem, not a crash
        Err(e @ StressError::Configuration(_)) => {
            println!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
