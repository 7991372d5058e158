//! LaTeX handling: document assembly, lossy text projections, and the
//! compiler adapter.

mod compiler;
mod convert;

pub use compiler::*;
pub use convert::*;
