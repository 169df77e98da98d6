//! Error types for model construction, configuration and solving.

use miette::{Diagnostic, SourceSpan};
use owo_colors::OwoColorize;
use thiserror::Error;

use crate::diagnostics::SolveDiagnostic;

/// Every way `Model::build` or a configuration setter can fail.
///
/// `SingularJacobian` is the one solve-time variant that is also returned as
/// an error: spec.md requires the whole solve to stop, not just the current
/// block, so the caller must observe it as a hard failure. `did-not-converge`
/// is deliberately absent here — it is reported per block via
/// [`crate::diagnostics::SolveDiagnostic`] and does not stop the driver.
#[derive(Error, Debug, Diagnostic)]
pub enum ModelError {
    #[error("equation is blank")]
    #[diagnostic(
        code(simblock::blank_input),
        help("every equation string must contain at least one non-whitespace character")
    )]
    BlankInput,

    #[error("malformed equation: {message}", message = self.message.cyan())]
    #[diagnostic(code(simblock::malformed_equation))]
    MalformedEquation {
        #[source_code]
        src: String,
        #[label("{message}")]
        span: SourceSpan,
        message: String,
    },

    #[error("variable {name} is unknown", name = self.name.cyan().bold())]
    #[diagnostic(
        code(simblock::unknown_variable),
        help("every endogenous variable must be referenced at current period by at least one equation")
    )]
    UnknownVariable { name: String },

    #[error(
        "token {token} collides with the lag-encoding sentinel",
        token = self.token.cyan()
    )]
    #[diagnostic(
        code(simblock::lag_collision),
        help("identifiers may not contain the reserved sequence \"___LAG\"")
    )]
    LagCollision { token: String },

    #[error("model is structurally singular: {matched} of {total} equations matched a variable")]
    #[diagnostic(
        code(simblock::structural_singularity),
        help("the system is over- or under-determined; check the equation and endogenous-variable counts")
    )]
    StructuralSingularity { matched: usize, total: usize },

    #[error("bipartite matching is ambiguous")]
    #[diagnostic(code(simblock::ambiguous_matching))]
    AmbiguousMatching,

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(simblock::invalid_configuration))]
    InvalidConfiguration { message: String },

    #[error("input data shape mismatch: {message}")]
    #[diagnostic(
        code(simblock::input_shape_mismatch),
        help("the panel must have a column for every endogenous/exogenous base variable and at least max_lag + 1 rows")
    )]
    InputShapeMismatch { message: String },

    #[error(
        "block {block} has a singular Jacobian at period {period}",
        block = self.block.to_string().red().bold()
    )]
    #[diagnostic(
        code(simblock::singular_jacobian),
        help("the Newton step's linear system has no unique solution; the solve was stopped")
    )]
    SingularJacobian {
        block: usize,
        period: usize,
        /// The full report (names and values in play when the solve gave up),
        /// carried here since the period driver stops before it can return
        /// this diagnostic through its normal `Vec<SolveDiagnostic>` path.
        diagnostic: Box<SolveDiagnostic>,
    },
}
