//! Core library for driving a text-adventure interpreter from a decision
//! agent.
//!
//! The pieces line up with one turn of play: the [`session`] orchestrator
//! sends a command to the subordinate interpreter process and reads text up
//! to the next prompt marker, the [`parser`] turns that text into a
//! structured [`parser::GameState`], an [`agent`] strategy (scripted list or
//! LLM-backed) picks the next command, and [`command::sanitize`] normalizes
//! it before it goes back out on the channel.

pub mod agent;
pub mod command;
pub mod parser;
pub mod session;
