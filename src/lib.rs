//! JSON-Schema driven reactive data.
//!
//! - [`schema`] compiles a raw JSON Schema (with `_abstract`, `_readonly`, …
//!   extensions) into an immutable, pointer-addressable [`SchemaTree`].
//! - [`dynamik`] lays a live JSON graph over that tree: proxies enforce
//!   read-only policy, run `_init`/`_expression` passes and emit change
//!   events.
//! - [`pointer`] is the absolute/relative pointer algebra both sides share.
//! - [`expr`] parses and evaluates the embedded template and expression
//!   language.
pub mod config;
pub mod dynamik;
pub mod expr;
pub mod path_de;
pub mod pointer;
pub mod schema;

pub use config::EngineConfig;
pub use dynamik::{ChangeEvent, DynPointer, DynProxy, Dynamik, DynamikBuilder, DynamikError, Listener, LiveValue};
pub use pointer::{Key, Pointer, PointerError};
pub use schema::{CompileError, DynAttr, SchemaCompiler, SchemaTree, StepError, compile};
