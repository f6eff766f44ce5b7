//! Code generation, assembly and execution of tempora units.
//!
//! A schema or a parsed query is turned into a textual listing
//! ([`emit`]). The build step assembles a listing into a [`CompiledUnit`]
//! ([`asm`]) which is stored as JSON. A loaded unit runs through the entry
//! points in [`exec`]:
//!
//! | symbol          | unit       | entry point            |
//! |-----------------|------------|------------------------|
//! | `make_database` | definition | [`exec::make_database`] |
//! | `get_size`      | definition | [`exec::get_size`]      |
//! | `query`         | query      | [`exec::run_query`]     |

pub mod asm;
pub mod emit;
pub mod error;
pub mod exec;
pub mod program;

pub use asm::assemble;
pub use emit::{GeneratedSource, definition_source, query_source};
pub use error::{Error, Result};
pub use exec::{QueryOutput, ResultSet};
pub use program::{CompiledUnit, Program};

#[cfg(test)]
mod tests;
