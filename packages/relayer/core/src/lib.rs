//! Command framework for the relayer binary.
//!
//! The framework knows nothing about any particular chain, signer or prover.
//! Independently developed [`Module`]s declare the [`Role`]s they fill, and the
//! framework assembles them into a [`Registry`] and a single [`CommandTree`]
//! before dispatching exactly one command per process invocation.

#![deny(clippy::nursery, clippy::pedantic, missing_docs)]

pub mod backend;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod framework;
pub mod module;
pub mod observability;
pub mod registry;
pub mod schema;

mod builtin;

pub use backend::{Backend, ChainBackend, LightClientState, ProverBackend, SignerBackend, StateProof};
pub use command::{CommandFragment, CommandHandler, CommandPath, CommandTree, Invocation, Parsed};
pub use config::{parse_config, BackendConfig, ChainConfig, RelayerConfig};
pub use context::CommandContext;
pub use error::{Collision, Error, UsageError};
pub use framework::{execute, App, Framework};
pub use module::{Factory, Module, Role};
pub use registry::{ChainBackends, Registry};
pub use schema::{ConfigSchema, FieldKind};
