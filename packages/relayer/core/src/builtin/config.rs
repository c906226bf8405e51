//! `config init` and `config show`.

use anyhow::{bail, Context as _};

use crate::{
    command::{CommandFragment, CommandHandler},
    config::RelayerConfig,
    context::CommandContext,
};

pub fn fragments() -> Vec<CommandFragment> {
    vec![
        CommandFragment::new(["config"], "Manage the configuration file"),
        CommandFragment::new(["config", "init"], "Create an empty configuration file")
            .handler(Init),
        CommandFragment::new(["config", "show"], "Print the configuration file").handler(Show),
    ]
}

struct Init;

#[async_trait::async_trait]
impl CommandHandler for Init {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let path = ctx.config_path()?;
        if path.exists() {
            bail!("config file already exists at {}", path.display());
        }
        RelayerConfig::default().save(&path)?;
        println!("config file created at {}", path.display());
        Ok(())
    }
}

struct Show;

#[async_trait::async_trait]
impl CommandHandler for Show {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let config = ctx.load_config()?;
        let rendered =
            serde_json::to_string_pretty(&config).context("failed to render configuration")?;
        println!("{rendered}");
        Ok(())
    }
}
