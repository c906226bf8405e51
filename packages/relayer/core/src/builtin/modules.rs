//! `modules list` and `modules schema`.

use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction};

use crate::{
    command::{CommandFragment, CommandHandler},
    context::CommandContext,
    module::Role,
};

pub fn fragments() -> Vec<CommandFragment> {
    vec![
        CommandFragment::new(["modules"], "Inspect the modules built into this binary"),
        CommandFragment::new(["modules", "list"], "List registered backends by role")
            .handler(List),
        CommandFragment::new(
            ["modules", "schema"],
            "Print the configuration schema of a backend",
        )
        .arg(
            Arg::new("role")
                .required(true)
                .action(ArgAction::Set)
                .value_parser(value_parser!(Role)),
        )
        .arg(Arg::new("id").required(true).action(ArgAction::Set))
        .handler(Schema),
    ]
}

struct List;

#[async_trait::async_trait]
impl CommandHandler for List {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let registry = ctx.registry();
        for role in Role::ALL {
            for id in registry.identifiers(role) {
                let module = registry.resolve(role, id)?;
                println!("{role:<7} {id:<12} {}", module.description());
            }
        }
        Ok(())
    }
}

struct Schema;

#[async_trait::async_trait]
impl CommandHandler for Schema {
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
        let role = *ctx
            .matches()
            .get_one::<Role>("role")
            .context("missing role argument")?;
        let id = ctx
            .matches()
            .get_one::<String>("id")
            .context("missing id argument")?;

        let schema = ctx.registry().resolve(role, id)?.schema(role)?;
        print!("{}", schema.help());
        Ok(())
    }
}
