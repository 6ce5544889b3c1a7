// lib.rs - beamsense library root
//
// Module-qualified completion and signature help for Erlang fragments,
// resolved against a live BEAM runtime. The binary in main.rs is a thin
// command-line wrapper over `handlers`.

pub mod call_site;
pub mod config;
pub mod cursor_context;
pub mod docs;
pub mod erl_subprocess;
pub mod error;
pub mod expr_parser;
pub mod handlers;
pub mod identifier;
pub mod introspection;
pub mod lexer;
pub mod module_cache;
pub mod perf;
pub mod signature;
pub mod state;
#[cfg(test)]
pub(crate) mod test_utils;
