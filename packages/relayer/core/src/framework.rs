//! Composition of modules into a runnable application.

use std::{
    ffi::{OsStr, OsString},
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{value_parser, Arg, ArgAction, ArgMatches};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    builtin,
    command::{CommandTree, Invocation, Parsed},
    context::HOME_ARG,
    error::Error,
    module::Module,
    observability::{init_observability, ObservabilityConfig},
    registry::Registry,
};

/// The id of the global `--log-level` flag.
pub const LOG_LEVEL_ARG: &str = "log-level";
/// The id of the global `--otel-endpoint` flag.
pub const OTEL_ENDPOINT_ARG: &str = "otel-endpoint";

const DEFAULT_NAME: &str = "relayer";

/// Exit status when a second interrupt aborts a command that ignored the first.
const FORCED_EXIT_CODE: i32 = 130;

/// Collects modules and turns them into an [`App`].
pub struct Framework {
    name: String,
    about: Option<String>,
    version: Option<String>,
    modules: Vec<Arc<dyn Module>>,
}

impl Framework {
    /// Create a framework for the executable `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: None,
            version: None,
            modules: Vec::new(),
        }
    }

    /// Set the top level help text.
    #[must_use]
    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = Some(about.into());
        self
    }

    /// Set the version reported by `--version`.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a module. Modules are registered in the order they are added.
    #[must_use]
    pub fn with_module<M: Module>(mut self, module: M) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    /// Add an already boxed module.
    #[must_use]
    pub fn with_boxed_module(mut self, module: Box<dyn Module>) -> Self {
        self.modules.push(Arc::from(module));
        self
    }

    /// Register every module and merge the built-in commands with the
    /// fragments contributed by the modules.
    ///
    /// Nothing is kept when any step fails: no module is registered and no
    /// command is reachable.
    ///
    /// # Errors
    /// Returns [`Error::Collision`] when two modules claim the same backend
    /// slot or two fragments claim the same command path, and
    /// [`Error::InvalidPath`] for a malformed fragment path.
    #[instrument(skip_all, fields(name = %self.name, modules = self.modules.len()))]
    pub fn build(self) -> Result<App, Error> {
        let registry = Registry::from_modules(self.modules)?;

        let mut tree = CommandTree::new(self.name)
            .global_arg(
                Arg::new(HOME_ARG)
                    .long("home")
                    .env("RELAYER_HOME")
                    .value_name("DIR")
                    .value_parser(value_parser!(PathBuf))
                    .action(ArgAction::Set)
                    .help("Relayer home directory [default: ~/.relayer]"),
            )
            .global_arg(
                Arg::new(LOG_LEVEL_ARG)
                    .long("log-level")
                    .env("RELAYER_LOG_LEVEL")
                    .value_name("LEVEL")
                    .default_value("info")
                    .action(ArgAction::Set)
                    .help("Log level: trace, debug, info, warn or error"),
            )
            .global_arg(
                Arg::new(OTEL_ENDPOINT_ARG)
                    .long("otel-endpoint")
                    .env("OTEL_EXPORTER_OTLP_ENDPOINT")
                    .value_name("URL")
                    .action(ArgAction::Set)
                    .help("Export traces and logs to this OTLP endpoint"),
            );
        if let Some(about) = self.about {
            tree = tree.about(about);
        }
        if let Some(version) = self.version {
            tree = tree.version(version);
        }

        for fragment in builtin::fragments() {
            tree.insert(builtin::OWNER, fragment)?;
        }
        for module in registry.modules() {
            for fragment in module.commands() {
                tree.insert(module.id(), fragment)?;
            }
        }
        tree.seal();

        info!(commands = tree.paths().len(), "command tree assembled");
        Ok(App { registry, tree })
    }
}

/// A sealed registry and command tree, ready to dispatch.
pub struct App {
    registry: Registry,
    tree: CommandTree,
}

impl App {
    /// The registered modules.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The merged command tree.
    #[must_use]
    pub const fn tree(&self) -> &CommandTree {
        &self.tree
    }

    /// Route an argument vector, including the program name, to a command.
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if no runnable command is selected.
    pub fn parse<I, T>(&mut self, args: I) -> Result<Parsed, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.tree.parse(args)
    }

    /// Run a parsed invocation.
    ///
    /// # Errors
    /// Returns [`Error::Handler`] with the handler's error, unchanged.
    pub async fn dispatch(
        &self,
        invocation: Invocation,
        cancellation: CancellationToken,
    ) -> Result<(), Error> {
        invocation
            .run(&self.registry, cancellation)
            .await
            .map_err(Error::Handler)
    }

    /// Parse `args` and run the selected command. Help output is printed to
    /// stdout.
    ///
    /// # Errors
    /// See [`App::parse`] and [`App::dispatch`].
    pub async fn run<I, T>(&mut self, args: I, cancellation: CancellationToken) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        match self.parse(args)? {
            Parsed::Help(text) => {
                print!("{text}");
                Ok(())
            }
            Parsed::Invocation(invocation) => self.dispatch(invocation, cancellation).await,
        }
    }
}

/// Build the application from `modules`, parse the process arguments and run
/// exactly one command.
///
/// Interrupting the process cancels the token handed to the running command.
/// A second interrupt terminates the process with status 130.
///
/// # Errors
/// Returns the first composition, usage or handler error.
pub async fn execute(modules: Vec<Box<dyn Module>>) -> Result<(), Error> {
    let args: Vec<OsString> = std::env::args_os().collect();
    let name = args
        .first()
        .and_then(|arg0| Path::new(arg0).file_stem())
        .and_then(OsStr::to_str)
        .unwrap_or(DEFAULT_NAME)
        .to_string();

    let mut app = modules
        .into_iter()
        .fold(
            Framework::new(name.clone())
                .about("Relay packets between heterogeneous chains")
                .version(env!("CARGO_PKG_VERSION")),
            Framework::with_boxed_module,
        )
        .build()?;

    let invocation = match app.parse(args)? {
        Parsed::Help(text) => {
            print!("{text}");
            return Ok(());
        }
        Parsed::Invocation(invocation) => invocation,
    };

    let _guard = init_observability(&observability_config(&name, &invocation.matches))
        .map_err(Error::Observability)?;

    let cancellation = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancellation = cancellation.clone();
        async move {
            if watch_interrupts(tokio::signal::ctrl_c, cancellation).await {
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    let result = app.dispatch(invocation, cancellation).await;
    interrupt.abort();
    result
}

/// Cancel `cancellation` on the first interrupt. Returns true once a second
/// interrupt arrives, false if signals cannot be received.
async fn watch_interrupts<F, Fut>(mut interrupted: F, cancellation: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    if interrupted().await.is_err() {
        return false;
    }
    info!("interrupt received, cancelling");
    cancellation.cancel();

    if interrupted().await.is_err() {
        return false;
    }
    warn!("second interrupt received, exiting");
    true
}

fn observability_config(name: &str, matches: &ArgMatches) -> ObservabilityConfig {
    let level = matches
        .get_one::<String>(LOG_LEVEL_ARG)
        .map_or("info", String::as_str);
    let endpoint = matches.get_one::<String>(OTEL_ENDPOINT_ARG).cloned();
    ObservabilityConfig::new(name, level, endpoint)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::*;
    use crate::{
        backend::Backend,
        command::{CommandFragment, CommandHandler, CommandPath},
        context::CommandContext,
        error::Collision,
        module::{Factory, Role},
        schema::ConfigSchema,
    };

    #[derive(Debug)]
    struct Dummy;

    impl Backend for Dummy {
        fn role(&self) -> Role {
            Role::Chain
        }
    }

    #[derive(Default)]
    struct Calls {
        factory: AtomicUsize,
        handler: AtomicUsize,
    }

    struct CountingFactory(Arc<Calls>);

    #[async_trait::async_trait]
    impl Factory for CountingFactory {
        async fn create(&self, _config: serde_json::Value) -> anyhow::Result<Box<dyn Backend>> {
            self.0.factory.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Dummy))
        }
    }

    struct Counting(Arc<Calls>);

    #[async_trait::async_trait]
    impl CommandHandler for Counting {
        async fn run(&self, _ctx: CommandContext<'_>) -> anyhow::Result<()> {
            self.0.handler.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl CommandHandler for Failing {
        async fn run(&self, _ctx: CommandContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("rpc endpoint unreachable")
        }
    }

    struct WaitForCancel(Arc<Calls>);

    #[async_trait::async_trait]
    impl CommandHandler for WaitForCancel {
        async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()> {
            ctx.cancellation().cancelled().await;
            self.0.handler.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TestModule {
        id: &'static str,
        calls: Arc<Calls>,
        commands: fn(Arc<Calls>) -> Vec<CommandFragment>,
    }

    impl TestModule {
        fn new(id: &'static str, commands: fn(Arc<Calls>) -> Vec<CommandFragment>) -> Self {
            Self {
                id,
                calls: Arc::default(),
                commands,
            }
        }
    }

    impl Module for TestModule {
        fn id(&self) -> &'static str {
            self.id
        }

        fn roles(&self) -> Vec<Role> {
            vec![Role::Chain]
        }

        fn schema(&self, role: Role) -> Result<ConfigSchema, Error> {
            match role {
                Role::Chain => Ok(ConfigSchema::new()),
                _ => Err(self.unsupported(role)),
            }
        }

        fn factory(&self, role: Role) -> Result<Arc<dyn Factory>, Error> {
            match role {
                Role::Chain => Ok(Arc::new(CountingFactory(self.calls.clone()))),
                _ => Err(self.unsupported(role)),
            }
        }

        fn commands(&self) -> Vec<CommandFragment> {
            (self.commands)(self.calls.clone())
        }
    }

    fn no_commands(_: Arc<Calls>) -> Vec<CommandFragment> {
        Vec::new()
    }

    fn height_command(calls: Arc<Calls>) -> Vec<CommandFragment> {
        vec![
            CommandFragment::new(["alpha"], "Alpha commands"),
            CommandFragment::new(["alpha", "height"], "Query the height").handler(Counting(calls)),
            CommandFragment::new(["alpha", "broken"], "Always fails").handler(Failing),
        ]
    }

    fn wait_command(calls: Arc<Calls>) -> Vec<CommandFragment> {
        vec![CommandFragment::new(["wait"], "Wait for cancellation").handler(WaitForCancel(calls))]
    }

    fn app(module: TestModule) -> App {
        Framework::new("relayer").with_module(module).build().unwrap()
    }

    #[test]
    fn built_in_commands_are_present() {
        let app = Framework::new("relayer").build().unwrap();
        for path in [
            CommandPath::from(["config", "init"]),
            CommandPath::from(["chains", "add-dir"]),
            CommandPath::from(["modules", "schema"]),
        ] {
            assert_eq!(app.tree().owner(&path), Some(builtin::OWNER), "{path}");
        }
        assert!(app.tree().is_sealed());
    }

    #[test]
    fn module_commands_are_owned_by_the_module() {
        let app = app(TestModule::new("alpha", height_command));
        assert_eq!(
            app.tree().owner(&CommandPath::from(["alpha", "height"])),
            Some("alpha")
        );
    }

    #[test]
    fn module_cannot_redefine_a_built_in_command() {
        fn config_group(_: Arc<Calls>) -> Vec<CommandFragment> {
            vec![CommandFragment::new(["config"], "Shadow the config group")]
        }

        let err = Framework::new("relayer")
            .with_module(TestModule::new("alpha", config_group))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Collision(Collision::Command { ref path }) if *path == CommandPath::from(["config"])
        ));
    }

    #[test]
    fn two_modules_claiming_one_path_fail_the_build() {
        let err = Framework::new("relayer")
            .with_module(TestModule::new("alpha", height_command))
            .with_module(TestModule::new("beta", height_command))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::Collision(_)));
    }

    #[test]
    fn module_cannot_redefine_a_global_flag() {
        fn home_flag(_: Arc<Calls>) -> Vec<CommandFragment> {
            vec![CommandFragment::new(["alpha", "go"], "Go")
                .arg(Arg::new("home").long("home").action(ArgAction::Set))
                .handler(Failing)]
        }

        let err = Framework::new("relayer")
            .with_module(TestModule::new("alpha", home_flag))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Collision(Collision::GlobalArg { ref arg, .. }) if arg == HOME_ARG
        ));
    }

    #[test]
    fn duplicate_backend_fails_the_build() {
        let err = Framework::new("relayer")
            .with_module(TestModule::new("alpha", no_commands))
            .with_module(TestModule::new("alpha", no_commands))
            .build()
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Collision(Collision::Backend { role: Role::Chain, ref id }) if id == "alpha"
        ));
    }

    #[tokio::test]
    async fn handler_runs_exactly_once() {
        let module = TestModule::new("alpha", height_command);
        let calls = module.calls.clone();
        let mut app = app(module);

        app.run(["relayer", "alpha", "height"], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(calls.handler.load(Ordering::SeqCst), 1);
        assert_eq!(calls.factory.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_command_runs_nothing() {
        let module = TestModule::new("alpha", height_command);
        let calls = module.calls.clone();
        let mut app = app(module);

        let err = app
            .run(["relayer", "alpha", "hieght"], CancellationToken::new())
            .await
            .unwrap_err();

        let Error::Usage(usage) = err else {
            panic!("expected usage error, got {err}");
        };
        assert_eq!(usage.nearest, CommandPath::from(["alpha"]));
        assert!(usage.suggestions.contains(&"height".to_string()));
        assert_eq!(calls.handler.load(Ordering::SeqCst), 0);
        assert_eq!(calls.factory.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_error_is_returned_unchanged() {
        let mut app = app(TestModule::new("alpha", height_command));

        let err = app
            .run(["relayer", "alpha", "broken"], CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Handler(_)));
        assert_eq!(err.to_string(), "rpc endpoint unreachable");
    }

    #[tokio::test]
    async fn help_runs_no_handler() {
        let module = TestModule::new("alpha", height_command);
        let calls = module.calls.clone();
        let mut app = app(module);

        let parsed = app.parse(["relayer", "alpha", "--help"]).unwrap();

        assert!(matches!(parsed, Parsed::Help(text) if text.contains("height")));
        assert_eq!(calls.handler.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_reaches_the_handler() {
        let module = TestModule::new("alpha", wait_command);
        let calls = module.calls.clone();
        let mut app = app(module);

        let token = CancellationToken::new();
        let cancel = token.clone();
        let (result, ()) = tokio::join!(app.run(["relayer", "wait"], token), async move {
            cancel.cancel();
        });

        result.unwrap();
        assert_eq!(calls.handler.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_interrupt_cancels_and_second_exits() {
        let notify = Arc::new(Notify::new());
        let token = CancellationToken::new();
        let watcher = tokio::spawn(watch_interrupts(
            {
                let notify = notify.clone();
                move || {
                    let notify = notify.clone();
                    async move {
                        notify.notified().await;
                        Ok(())
                    }
                }
            },
            token.clone(),
        ));

        notify.notify_one();
        token.cancelled().await;
        assert!(!watcher.is_finished());

        notify.notify_one();
        assert!(watcher.await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_signals_cancel_nothing() {
        let token = CancellationToken::new();
        let forced = watch_interrupts(
            || async { Err(io::Error::other("no signal handler")) },
            token.clone(),
        )
        .await;

        assert!(!forced);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn home_flag_reaches_built_in_commands() {
        let home = tempfile::tempdir().unwrap();
        let mut app = Framework::new("relayer").build().unwrap();

        app.run(
            [
                OsString::from("relayer"),
                OsString::from("--home"),
                home.path().as_os_str().to_owned(),
                OsString::from("config"),
                OsString::from("init"),
            ],
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(crate::config::config_path(home.path()).exists());
    }

    #[test]
    fn log_level_defaults_to_info() {
        let mut app = Framework::new("relayer").build().unwrap();
        let Parsed::Invocation(invocation) = app.parse(["relayer", "modules", "list"]).unwrap()
        else {
            panic!("expected an invocation");
        };
        let config = observability_config("relayer", &invocation.matches);
        assert_eq!(config.level(), tracing::Level::INFO);
    }
}
