// Allow clippy lints that suggest unstable features or are too strict for generated code
#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::field_reassign_with_default)]

pub mod block;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod graph;
pub mod lexer;
pub mod model;
pub mod solver;

pub use block::{BlockMember, BlockSummary, CompiledBlock};
pub use dataset::Panel;
pub use diagnostics::{DiagnosticKind, SolveDiagnostic};
pub use error::ModelError;
pub use model::{AugmentedCondensation, Model, SolverConfig};
