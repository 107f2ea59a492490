//! Clipforge - natural language to ffmpeg, with a safety gate
//!
//! Free text goes through an LLM into a validated [`llm::Intent`], which
//! is routed to a [`command::CommandPlan`], compiled into argument vectors
//! under a directory sandbox, previewed, and executed only on
//! confirmation. The crate never touches media itself; it only constructs
//! argv arrays for the external ffmpeg binary.

pub mod command;
pub mod core;
pub mod llm;
pub mod session;
