mod cli;

use anyhow::Result;
use tracing_subscriber;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("spark_opt=info,client=info,common=info")
        .init();

    cli::run()
}
