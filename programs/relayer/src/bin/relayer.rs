use ibc_relayer::modules;
use ibc_relayer_core::execute;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Ok(execute(modules()).await?)
}
