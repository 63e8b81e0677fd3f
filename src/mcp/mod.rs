//! Stdio tool-RPC facade: the same ten operations the HTTP facade exposes,
//! reachable by an MCP client over stdin/stdout.

mod server;

pub use server::{EngramServer, run};
