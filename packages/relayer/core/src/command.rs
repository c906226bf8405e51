//! The merged command tree and its dispatcher.
//!
//! Built-in commands and module fragments are inserted into one [`CommandTree`]
//! while it is `Building`. The first call to [`CommandTree::parse`] seals it;
//! from then on the tree only routes argument vectors to handlers.

use std::{ffi::OsString, fmt, sync::Arc};

use clap::{error::ErrorKind, Arg, ArgMatches};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    context::CommandContext,
    error::{Collision, Error, UsageError},
    registry::Registry,
};

/// An ordered sequence of command names, e.g. `chains list`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandPath(Vec<String>);

impl CommandPath {
    /// The empty path, which names the executable itself.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns true for the empty path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The individual command names.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns this path extended by one segment.
    #[must_use]
    pub fn join(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.iter().all(|s| {
                !s.is_empty() && !s.starts_with('-') && !s.chars().any(char::is_whitespace)
            })
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl<const N: usize> From<[&str; N]> for CommandPath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(ToString::to_string).collect())
    }
}

impl From<Vec<String>> for CommandPath {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

/// The `CommandHandler` trait is implemented by the action behind a command.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command.
    async fn run(&self, ctx: CommandContext<'_>) -> anyhow::Result<()>;
}

/// A piece of the command tree contributed by a module or by the framework.
///
/// A fragment without a handler declares a command group: it only carries
/// help text and must be followed by one of its subcommands.
#[derive(Clone)]
pub struct CommandFragment {
    path: CommandPath,
    about: String,
    args: Vec<Arg>,
    handler: Option<Arc<dyn CommandHandler>>,
}

impl CommandFragment {
    /// Create a fragment at `path`. Without a handler it declares a group.
    #[must_use]
    pub fn new(path: impl Into<CommandPath>, about: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            about: about.into(),
            args: Vec::new(),
            handler: None,
        }
    }

    /// Add a flag or positional argument.
    #[must_use]
    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// Set the action run when this command is selected.
    #[must_use]
    pub fn handler(mut self, handler: impl CommandHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// The path claimed by this fragment.
    #[must_use]
    pub const fn path(&self) -> &CommandPath {
        &self.path
    }
}

impl fmt::Debug for CommandFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFragment")
            .field("path", &self.path)
            .field("about", &self.about)
            .field("runnable", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

/// The result of parsing an argument vector.
pub enum Parsed {
    /// Help or version output was requested; nothing should run.
    Help(String),
    /// A runnable command was selected.
    Invocation(Invocation),
}

/// A selected command together with its parsed arguments.
pub struct Invocation {
    /// The selected command path.
    pub path: CommandPath,
    /// Arguments of the selected command, including global flags.
    pub matches: ArgMatches,
    handler: Arc<dyn CommandHandler>,
}

impl Invocation {
    /// Run the selected handler. Consumes the invocation so it runs once.
    ///
    /// # Errors
    /// Returns whatever the handler returns.
    pub async fn run(
        self,
        registry: &Registry,
        cancellation: CancellationToken,
    ) -> anyhow::Result<()> {
        debug!(command = %self.path, "dispatching command");
        let ctx = CommandContext::new(&self.matches, registry, cancellation);
        self.handler.run(ctx).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Building,
    Sealed,
}

struct Claim {
    owner: String,
    about: String,
    args: Vec<Arg>,
    handler: Option<Arc<dyn CommandHandler>>,
}

#[derive(Default)]
struct Node {
    claim: Option<Claim>,
    children: IndexMap<String, Node>,
}

/// The merged, collision free hierarchy of commands.
pub struct CommandTree {
    name: String,
    about: Option<String>,
    version: Option<String>,
    global_args: Vec<Arg>,
    root: Node,
    state: State,
}

impl CommandTree {
    /// Create an empty tree for the executable `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: None,
            version: None,
            global_args: Vec::new(),
            root: Node::default(),
            state: State::Building,
        }
    }

    /// Set the description of the executable.
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

    /// Add a flag accepted by every command.
    #[must_use]
    pub fn global_arg(mut self, arg: Arg) -> Self {
        self.global_args.push(arg.global(true));
        self
    }

    /// Insert a fragment on behalf of `owner`.
    ///
    /// # Errors
    /// Returns [`Error::Sealed`] once the tree is sealed, [`Error::InvalidPath`]
    /// for an empty or malformed path and a [`Collision`] if the path is
    /// already claimed or an argument reuses the id, long or short name of a
    /// global flag. A failed insert leaves the tree untouched.
    pub fn insert(&mut self, owner: &str, fragment: CommandFragment) -> Result<(), Error> {
        let CommandFragment {
            path,
            about,
            args,
            handler,
        } = fragment;

        if self.state == State::Sealed {
            return Err(Error::Sealed { path });
        }
        if !path.is_valid() {
            return Err(Error::InvalidPath { path });
        }
        if self.contains(&path) {
            return Err(Error::Collision(Collision::Command { path }));
        }
        if let Some(global) = self.shadowed_global(&args) {
            let arg = global.get_id().to_string();
            return Err(Error::Collision(Collision::GlobalArg { path, arg }));
        }

        let mut node = &mut self.root;
        for segment in path.segments() {
            node = node.children.entry(segment.clone()).or_default();
        }
        node.claim = Some(Claim {
            owner: owner.to_string(),
            about,
            args,
            handler,
        });
        Ok(())
    }

    fn shadowed_global(&self, args: &[Arg]) -> Option<&Arg> {
        self.global_args.iter().find(|global| {
            args.iter().any(|arg| {
                arg.get_id() == global.get_id()
                    || (arg.get_long().is_some() && arg.get_long() == global.get_long())
                    || (arg.get_short().is_some() && arg.get_short() == global.get_short())
            })
        })
    }

    /// Freeze the tree. Further insertions fail.
    pub fn seal(&mut self) {
        self.state = State::Sealed;
    }

    /// Returns true once the tree has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state == State::Sealed
    }

    /// Returns true if a fragment claims `path`.
    #[must_use]
    pub fn contains(&self, path: &CommandPath) -> bool {
        self.node(path).is_some_and(|node| node.claim.is_some())
    }

    /// Returns who inserted the fragment at `path`.
    #[must_use]
    pub fn owner(&self, path: &CommandPath) -> Option<&str> {
        self.node(path)?.claim.as_ref().map(|c| c.owner.as_str())
    }

    /// Every claimed path, depth first in insertion order.
    #[must_use]
    pub fn paths(&self) -> Vec<CommandPath> {
        fn walk(node: &Node, prefix: &CommandPath, out: &mut Vec<CommandPath>) {
            for (name, child) in &node.children {
                let path = prefix.join(name.clone());
                if child.claim.is_some() {
                    out.push(path.clone());
                }
                walk(child, &path, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &CommandPath::root(), &mut out);
        out
    }

    /// Seal the tree and route `args` (including the program name) to a command.
    ///
    /// # Errors
    /// Returns [`Error::Usage`] if the arguments do not select a runnable command.
    pub fn parse<I, T>(&mut self, args: I) -> Result<Parsed, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.seal();
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

        let matches = match self.to_clap().try_get_matches_from(&args) {
            Ok(matches) => matches,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                return Ok(Parsed::Help(e.render().to_string()));
            }
            Err(e) => return Err(self.usage_error(&args, e.render().to_string()).into()),
        };

        let mut path = Vec::new();
        let mut node = &self.root;
        let mut current = &matches;
        while let Some((name, sub)) = current.subcommand() {
            let Some(child) = node.children.get(name) else {
                break;
            };
            path.push(name.to_string());
            node = child;
            current = sub;
        }

        match node.claim.as_ref().and_then(|c| c.handler.clone()) {
            Some(handler) => Ok(Parsed::Invocation(Invocation {
                path: path.into(),
                matches: current.clone(),
                handler,
            })),
            None => Err(self
                .usage_error(&args, "error: a subcommand is required".to_string())
                .into()),
        }
    }

    fn node(&self, path: &CommandPath) -> Option<&Node> {
        path.segments()
            .iter()
            .try_fold(&self.root, |node, segment| node.children.get(segment))
    }

    fn to_clap(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.name.clone())
            .disable_help_subcommand(true)
            .args(self.global_args.iter().cloned());
        if let Some(about) = &self.about {
            cmd = cmd.about(about.clone());
        }
        if let Some(version) = &self.version {
            cmd = cmd.version(version.clone());
        }
        with_children(cmd, &self.root)
    }

    /// Find the deepest command named by the leading non-flag arguments.
    fn usage_error(&self, args: &[OsString], message: String) -> UsageError {
        let mut node = &self.root;
        let mut nearest = CommandPath::root();
        let mut tokens = args.iter().skip(1);
        while let Some(token) = tokens.next() {
            let Some(token) = token.to_str() else { break };
            if token.starts_with('-') {
                if self.takes_value(token) {
                    tokens.next();
                }
                continue;
            }
            let Some(child) = node.children.get(token) else {
                break;
            };
            nearest = nearest.join(token);
            node = child;
        }
        UsageError {
            message: message.trim_end().to_string(),
            nearest,
            suggestions: node.children.keys().cloned().collect(),
        }
    }

    /// Returns true if `flag` is a global flag whose value is the next token.
    fn takes_value(&self, flag: &str) -> bool {
        if flag.contains('=') {
            return false;
        }
        self.global_args.iter().any(|arg| {
            let named = flag.strip_prefix("--").map_or_else(
                || {
                    flag.strip_prefix('-')
                        .and_then(|s| s.chars().next())
                        .zip(arg.get_short())
                        .is_some_and(|(given, short)| given == short)
                },
                |long| arg.get_long() == Some(long),
            );
            named && arg.get_action().takes_values()
        })
    }
}

fn with_children(cmd: clap::Command, node: &Node) -> clap::Command {
    if node.children.is_empty() {
        return cmd;
    }
    let runnable = node.claim.as_ref().is_some_and(|c| c.handler.is_some());
    cmd.subcommand_required(!runnable)
        .subcommands(node.children.iter().map(|(name, child)| {
            let mut sub = clap::Command::new(name.clone()).disable_help_subcommand(true);
            if let Some(claim) = &child.claim {
                sub = sub.about(claim.about.clone()).args(claim.args.iter().cloned());
            }
            with_children(sub, child)
        }))
}
