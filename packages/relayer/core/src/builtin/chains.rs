//! `chains list`, `chains add-dir` and `chains check`.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context as _};
use clap::{value_parser, Arg, ArgAction};
use tracing::info;

use crate::{
    command::{CommandFragment, CommandHandler},
    config::ChainConfig,
    context::CommandContext,
    module::Role,
};

pub fn fragments() -> Vec<CommandFragment> {
    vec![
        CommandFragment::new(["chains"], "Manage configured chains"),
        CommandFragment::new(["chains", "list"], "List configured chains").handler(List),
        CommandFragment::new(
            ["chains", "add-dir"],
            "Add every chain definition (*.json) found in a directory",
        )
        .arg(
            Arg::new("dir")
                .required(true)
                .action(ArgAction::Set)
                .value_parser(value_parser!(PathBuf))
                .help("Directory containing chain definitions"),
        )
        .handler(AddDir),
        CommandFragment::new(
            ["chains", "check"],
            "Construct the backends of configured chains",
        )
        .arg(
            Arg::new("chain")
                .long("chain")
                .action(ArgAction::Set)
                .help("Only check this chain"),
        )
        .handler(Check),
    ]
}

fn describe(chain: &ChainConfig) -> String {
    format!(
        "chain={} signer={} prover={}",
        chain.chain.module,
        chain.signer.as_ref().map_or("-", |s| s.module.as_str()),
        chain.prover.module
    )
}

struct List;

#[async_trait::async_trait]
impl CommandHandler for List {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let config = ctx.load_config()?;
        for chain in &config.chains {
            let state = if chain.enabled { "" } else { " (disabled)" };
            println!("{}: {}{state}", chain.name, describe(chain));
        }
        Ok(())
    }
}

struct AddDir;

#[async_trait::async_trait]
impl CommandHandler for AddDir {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let dir = ctx
            .matches()
            .get_one::<PathBuf>("dir")
            .context("missing directory argument")?;
        let mut config = ctx.load_config()?;

        let mut files = fs::read_dir(dir)
            .with_context(|| format!("failed to read {}", dir.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        files.retain(|path| path.extension().is_some_and(|ext| ext == "json"));
        files.sort();

        if files.is_empty() {
            bail!("no chain definitions found in {}", dir.display());
        }

        // The file is only written once every definition has been accepted.
        for file in &files {
            let chain = ChainConfig::from_file(file)?;
            let backends = [
                Some((Role::Chain, &chain.chain)),
                chain.signer.as_ref().map(|s| (Role::Signer, s)),
                Some((Role::Prover, &chain.prover)),
            ];
            for (role, backend) in backends.into_iter().flatten() {
                ctx.registry()
                    .validate(role, backend)
                    .with_context(|| format!("chain `{}` in {}", chain.name, file.display()))?;
            }
            info!(chain = %chain.name, file = %file.display(), "chain definition accepted");
            config.add_chain(chain)?;
        }

        config.save(ctx.config_path()?)?;
        println!("added {} chain(s) from {}", files.len(), dir.display());
        Ok(())
    }
}

struct Check;

#[async_trait::async_trait]
impl CommandHandler for Check {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let config = ctx.load_config()?;
        let selected = ctx.matches().get_one::<String>("chain");

        let chains: Vec<&ChainConfig> = match selected {
            Some(name) => vec![config
                .chain(name)
                .with_context(|| format!("chain `{name}` is not configured"))?],
            None => config.chains.iter().filter(|c| c.enabled).collect(),
        };

        for chain in chains {
            ctx.until_cancelled(ctx.registry().build_chain(chain))
                .await??;
            println!("{}: ok ({})", chain.name, describe(chain));
        }
        Ok(())
    }
}
