use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    diffwatch_cli::main_entry().await
}
