//! The public `Model` type: construction (components A→B→C) and the Period
//! Driver (component E, component D per block per period).
//!
//! Grounded in `src/compiler.rs`'s builder-style public API shape, and in the
//! original implementation's `__init__` (staging order: analyze equations,
//! derive variable universe, causalize, compile blocks) and `solve_model`
//! (the period loop itself).

use std::collections::HashSet;
use std::sync::RwLock;

use crate::block::{BlockMember, BlockSummary, CompiledBlock};
use crate::dataset::Panel;
use crate::diagnostics::{DiagnosticKind, SolveDiagnostic};
use crate::error::ModelError;
use crate::expr::Expr;
use crate::graph;
use crate::lexer::{self, decode_lag};
use crate::solver::{self, SolveStatus};

/// The tunable knobs of the Newton–Raphson solver. Everything else about a
/// [`Model`] is fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    root_tolerance: f64,
    max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            root_tolerance: 1e-7,
            max_iterations: 10,
        }
    }
}

impl SolverConfig {
    pub fn root_tolerance(&self) -> f64 {
        self.root_tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn set_root_tolerance(&mut self, tolerance: f64) -> Result<(), ModelError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ModelError::InvalidConfiguration {
                message: format!("root_tolerance must be a positive finite number, got {tolerance}"),
            });
        }
        self.root_tolerance = tolerance;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<(), ModelError> {
        if max_iterations == 0 {
            return Err(ModelError::InvalidConfiguration {
                message: "max_iterations must be a positive integer".to_string(),
            });
        }
        self.max_iterations = max_iterations;
        Ok(())
    }
}

/// Read-only view of the condensation graph augmented with exogenous nodes,
/// for the external visualization collaborator named in spec §6. Never
/// consulted during `solve`.
#[derive(Debug, Clone)]
pub struct AugmentedCondensation {
    pub blocks: Vec<BlockSummary>,
    /// `block_dependencies[i]` lists the other block indices `i` reads
    /// current-period endogenous values from.
    pub block_dependencies: Vec<Vec<usize>>,
    /// `exogenous_inputs[i]` lists the genuinely exogenous (non-endogenous)
    /// current-period columns feeding block `i`.
    pub exogenous_inputs: Vec<Vec<String>>,
}

/// A compiled, immutable simultaneous-equation model.
///
/// Built once via [`Model::build`]; thereafter only the solver tolerance and
/// iteration cap may change (through [`Model::config_mut`]'s setters).
pub struct Model {
    blocks: Vec<CompiledBlock>,
    endogenous: Vec<String>,
    max_lag: i64,
    config: RwLock<SolverConfig>,
    last_solution: RwLock<Option<Panel>>,
}

impl Model {
    /// Build a model from raw equation strings and the designated endogenous
    /// variable names. Runs components A, B, and C once; after this returns,
    /// the model never re-parses or re-causalizes.
    pub fn build(equations: &[String], endogenous: &[String]) -> Result<Model, ModelError> {
        let mut endogenous_norm: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for name in endogenous {
            let normalized = name.to_lowercase();
            if seen.insert(normalized.clone()) {
                endogenous_norm.push(normalized);
            }
        }

        let analyzed: Vec<_> = equations
            .iter()
            .map(|raw| lexer::analyze_equation(raw))
            .collect::<Result<_, _>>()?;

        let max_lag = analyzed.iter().map(|a| a.max_lag).max().unwrap_or(0);

        let parsed: Vec<(Expr, Expr)> = analyzed
            .iter()
            .map(|a| {
                crate::expr::parse_equation(&a.tokens).map_err(|message| {
                    ModelError::MalformedEquation {
                        src: a.rewritten.clone(),
                        span: miette::SourceSpan::new(0.into(), a.rewritten.len()),
                        message,
                    }
                })
            })
            .collect::<Result<_, _>>()?;

        let residuals: Vec<Expr> = parsed
            .iter()
            .map(|(lhs, rhs)| Expr::Sub(Box::new(lhs.clone()), Box::new(rhs.clone())))
            .collect();

        let lhs_hint: Vec<Option<String>> = parsed
            .iter()
            .map(|(lhs, _)| match lhs {
                Expr::Var(name) => Some(name.clone()),
                _ => None,
            })
            .collect();

        let current_period_refs: Vec<HashSet<String>> =
            residuals.iter().map(Expr::variables).collect();

        for name in &endogenous_norm {
            let referenced = current_period_refs.iter().any(|refs| refs.contains(name));
            if !referenced {
                return Err(ModelError::UnknownVariable { name: name.clone() });
            }
        }

        let causalization = graph::causalize(&current_period_refs, &lhs_hint, &endogenous_norm)?;

        let blocks: Vec<CompiledBlock> = causalization
            .blocks
            .iter()
            .map(|scc| {
                let members: Vec<BlockMember> = scc
                    .iter()
                    .map(|&eq_idx| BlockMember {
                        raw: equations[eq_idx].clone(),
                        residual: residuals[eq_idx].clone(),
                        endogenous: causalization.matching[&eq_idx].clone(),
                    })
                    .collect();
                CompiledBlock::compile(&members)
            })
            .collect();

        log::info!(
            "built model: {} equations, {} endogenous variables, {} blocks, max_lag={max_lag}",
            equations.len(),
            endogenous_norm.len(),
            blocks.len()
        );

        Ok(Model {
            blocks,
            endogenous: endogenous_norm,
            max_lag,
            config: RwLock::new(SolverConfig::default()),
            last_solution: RwLock::new(None),
        })
    }

    pub fn blocks(&self) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| b.summary(i))
            .collect()
    }

    /// The index of the block that solves for `name`, if `name` is one of
    /// this model's endogenous variables.
    pub fn find_endogenous(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.blocks
            .iter()
            .position(|b| b.endogenous.iter().any(|e| e == &name))
    }

    pub fn max_lag(&self) -> i64 {
        self.max_lag
    }

    pub fn endogenous_variables(&self) -> &[String] {
        &self.endogenous
    }

    pub fn config(&self) -> SolverConfig {
        *self.config.read().expect("config lock poisoned")
    }

    /// Mutate the solver tolerance/iteration cap through a closure, so the
    /// validating setters run under the lock in one step.
    pub fn configure(
        &self,
        f: impl FnOnce(&mut SolverConfig) -> Result<(), ModelError>,
    ) -> Result<(), ModelError> {
        let mut guard = self.config.write().expect("config lock poisoned");
        f(&mut guard)
    }

    pub fn last_solution(&self) -> Option<Panel> {
        self.last_solution.read().expect("last_solution lock poisoned").clone()
    }

    /// Structural view of the condensation graph augmented with exogenous
    /// nodes, for the external visualization collaborator.
    pub fn augmented_condensation(&self) -> AugmentedCondensation {
        let endogenous_to_block: std::collections::HashMap<&str, usize> = self
            .blocks
            .iter()
            .enumerate()
            .flat_map(|(i, b)| b.endogenous.iter().map(move |name| (name.as_str(), i)))
            .collect();

        let mut block_dependencies = Vec::with_capacity(self.blocks.len());
        let mut exogenous_inputs = Vec::with_capacity(self.blocks.len());

        for (i, block) in self.blocks.iter().enumerate() {
            let mut deps = Vec::new();
            let mut exo = Vec::new();
            for name in &block.exogenous_order {
                let (base, lag) = decode_lag(name);
                if lag != 0 {
                    continue;
                }
                match endogenous_to_block.get(base.as_str()) {
                    Some(&j) if j != i => {
                        if !deps.contains(&j) {
                            deps.push(j);
                        }
                    }
                    Some(_) => {}
                    None => exo.push(base),
                }
            }
            block_dependencies.push(deps);
            exogenous_inputs.push(exo);
        }

        AugmentedCondensation {
            blocks: self.blocks(),
            block_dependencies,
            exogenous_inputs,
        }
    }

    /// Run the Period Driver: for every period from `max_lag` to the last
    /// row, solve every block in topological order, writing converged
    /// results back into `panel`.
    pub fn solve(&self, panel: &mut Panel) -> Result<Vec<SolveDiagnostic>, ModelError> {
        let config = self.config();
        let min_rows = self.max_lag as usize + 1;
        if panel.nrows() < min_rows {
            return Err(ModelError::InputShapeMismatch {
                message: format!(
                    "panel has {} rows, need at least {min_rows} (max_lag + 1)",
                    panel.nrows()
                ),
            });
        }
        for block in &self.blocks {
            for name in &block.endogenous {
                if !panel.has_column(name) {
                    return Err(ModelError::InputShapeMismatch {
                        message: format!("missing endogenous column '{name}'"),
                    });
                }
            }
            for name in &block.exogenous_order {
                let (base, _) = decode_lag(name);
                if !panel.has_column(&base) {
                    return Err(ModelError::InputShapeMismatch {
                        message: format!(
                            "missing column '{base}' required by exogenous reference '{name}'"
                        ),
                    });
                }
            }
        }

        let mut diagnostics = Vec::new();

        for period in (self.max_lag as usize)..panel.nrows() {
            for (block_idx, block) in self.blocks.iter().enumerate() {
                let exo_vals: Vec<f64> = block
                    .exogenous_order
                    .iter()
                    .map(|name| {
                        let (base, lag) = decode_lag(name);
                        let row = period as i64 - lag;
                        panel.get(row as usize, &base).unwrap_or(0.0)
                    })
                    .collect();
                let x0: Vec<f64> = block
                    .endogenous
                    .iter()
                    .map(|name| panel.get(period, name).unwrap_or(0.0))
                    .collect();

                let outcome = solver::solve_block(
                    block,
                    &x0,
                    &exo_vals,
                    config.root_tolerance(),
                    config.max_iterations(),
                );

                match outcome.status {
                    SolveStatus::Converged => {
                        for (i, name) in block.endogenous.iter().enumerate() {
                            panel.set(period, name, outcome.x[i]);
                        }
                        log::debug!(
                            "block {block_idx} converged at period {period} in {} iterations",
                            outcome.iterations
                        );
                    }
                    SolveStatus::DidNotConverge => {
                        log::warn!("block {block_idx} did not converge at period {period}");
                        diagnostics.push(SolveDiagnostic {
                            block: block_idx,
                            period,
                            kind: DiagnosticKind::DidNotConverge,
                            endogenous: block.endogenous.clone(),
                            exogenous: block.exogenous_order.clone(),
                            endogenous_values: outcome.x.iter().copied().collect(),
                            exogenous_values: exo_vals,
                        });
                    }
                    SolveStatus::SingularJacobian => {
                        let diagnostic = SolveDiagnostic {
                            block: block_idx,
                            period,
                            kind: DiagnosticKind::SingularJacobian,
                            endogenous: block.endogenous.clone(),
                            exogenous: block.exogenous_order.clone(),
                            endogenous_values: outcome.x.iter().copied().collect(),
                            exogenous_values: exo_vals,
                        };
                        log::error!(
                            "block {block_idx} has a singular jacobian at period {period}: \
                             endogenous={:?}={:?} exogenous={:?}={:?}",
                            diagnostic.endogenous,
                            diagnostic.endogenous_values,
                            diagnostic.exogenous,
                            diagnostic.exogenous_values,
                        );
                        *self.last_solution.write().expect("last_solution lock poisoned") =
                            Some(panel.clone());
                        return Err(ModelError::SingularJacobian {
                            block: block_idx,
                            period,
                            diagnostic: Box::new(diagnostic),
                        });
                    }
                }
            }
        }

        *self.last_solution.write().expect("last_solution lock poisoned") = Some(panel.clone());
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cascade_model() {
        let equations = vec!["y = x".to_string(), "z = y + 1".to_string()];
        let endogenous = vec!["y".to_string(), "z".to_string()];
        let model = Model::build(&equations, &endogenous).unwrap();
        assert_eq!(model.blocks().len(), 2);
        assert_eq!(model.max_lag(), 0);
    }

    #[test]
    fn rejects_unreferenced_endogenous() {
        let equations = vec!["y = x".to_string()];
        let endogenous = vec!["y".to_string(), "z".to_string()];
        let err = Model::build(&equations, &endogenous).unwrap_err();
        assert!(matches!(err, ModelError::UnknownVariable { .. }));
    }

    #[test]
    fn solves_simple_cascade_over_panel() {
        let equations = vec!["y = x".to_string(), "z = y + 1".to_string()];
        let endogenous = vec!["y".to_string(), "z".to_string()];
        let model = Model::build(&equations, &endogenous).unwrap();

        let columns = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        let mut panel = Panel::from_rows(
            &columns,
            vec![vec![1.0, 0.0, 0.0], vec![2.0, 0.0, 0.0], vec![3.0, 0.0, 0.0]],
        )
        .unwrap();

        let diagnostics = model.solve(&mut panel).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(panel.get(0, "y"), Some(1.0));
        assert_eq!(panel.get(0, "z"), Some(2.0));
        assert_eq!(panel.get(2, "y"), Some(3.0));
        assert_eq!(panel.get(2, "z"), Some(4.0));
    }

    #[test]
    fn config_setters_validate() {
        let model = Model::build(&["y = x".to_string()], &["y".to_string()]).unwrap();
        let err = model
            .configure(|c| c.set_root_tolerance(-1.0))
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfiguration { .. }));
        model.configure(|c| c.set_max_iterations(5)).unwrap();
        assert_eq!(model.config().max_iterations(), 5);
    }
}
