//! # inibake-core
//!
//! Compiler and interpreter for INI-shaped automation scripts.
//!
//! A script is an INI file whose code sections hold one command per line,
//! `Opcode,Operand1,Operand2,...`. This crate splits and parses those lines,
//! compiles `If`/`Else`/`Begin`/`End` into nested blocks, and runs them
//! against a three-tier variable store, a registry backend and the file
//! system while recording a structured build log.
//!
//! ## Modules
//!
//! - [`splitter`] - Line continuation, comments and operand splitting
//! - [`opcode`] - Opcode names and resolution, with macro fallback
//! - [`command`] - Typed commands and their operand grammar
//! - [`condition`] - Branch conditions for `If`
//! - [`compiler`] - Folds branches and code blocks into nested bodies
//! - [`check`] - Compiles code sections without running them
//! - [`variables`] - Fixed/Global/Local variables and `#n` parameters
//! - [`escaper`] - `#$` escape sequences and registry value packing
//! - [`macros`] - Global and local macro tables
//! - [`engine`] - Command dispatcher, section calls, loops and callbacks
//! - [`script`] - Scripts, sections and projects
//! - [`ini`] - Line-preserving INI documents
//! - [`registry`] - Registry backend trait with an in-memory implementation
//! - [`encoded`] - Codec for files attached to scripts
//! - [`network`] - Ping and online probes
//! - [`log`] - Build log entries
//! - [`config`] - Engine limits and paths
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```no_run
//! use inibake_core::config::EngineConfig;
//! use inibake_core::engine::EngineState;
//! use inibake_core::script::Project;
//!
//! let project = Project::load("projects/Demo").expect("Failed to load project");
//! let mut state = EngineState::new(project, EngineConfig::load());
//!
//! let event = state.run_build();
//! print!("{}", state.log().render_trace());
//! println!("Build finished: {}", event);
//! ```

pub mod check;
pub mod command;
pub mod compiler;
pub mod condition;
pub mod config;
pub mod encoded;
pub mod engine;
pub mod error;
pub mod escaper;
pub mod ini;
pub mod log;
pub mod macros;
pub mod network;
pub mod opcode;
pub mod registry;
pub mod script;
pub mod splitter;
pub mod variables;
