#[tokio::main]
async fn main() -> eyre::Result<()> {
    ona::run().start().await
}
