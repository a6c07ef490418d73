use anyhow::Result;
use errand::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run().await
}
