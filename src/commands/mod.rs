//! Command implementations
//!
//! Each module backs one group of CLI subcommands.

pub mod ask;
pub mod build;

pub use ask::{load_engine, run_ask, run_chat, run_overview};
pub use build::{pipeline, run_build, run_chunk, run_graph, run_summarize};
