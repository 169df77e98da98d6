//! Compiled simultaneous-solve blocks (component C).
//!
//! A block groups the equations in one strongly connected component of the
//! causalized dependency graph, each already matched to the endogenous
//! variable it solves for. Compiling a block means differentiating every
//! residual with respect to every one of the block's endogenous variables
//! and lowering the resulting expressions into one shared [`Program`], so
//! that evaluating `F` and `J` at a point is a single tape walk.
//!
//! Grounded in the original implementation's `_gen_simulation_code`/
//! `_gen_obj_fun_and_jac` (one block compiles to one objective vector and one
//! Jacobian, both driven off the same variable ordering).

use std::collections::{BTreeSet, HashMap, HashSet};

use nalgebra::{DMatrix, DVector};

use crate::expr::{Expr, Program};
use crate::lexer::decode_lag;

/// One equation already matched to the endogenous variable it solves for,
/// ready to be grouped into a block.
#[derive(Debug, Clone)]
pub struct BlockMember {
    pub raw: String,
    pub residual: Expr,
    pub endogenous: String,
}

/// Structural summary of a block, with no compiled numeric backend. What
/// [`crate::model::Model::blocks`] hands back for inspection/visualization.
#[derive(Debug, Clone)]
pub struct BlockSummary {
    pub index: usize,
    pub endogenous: Vec<String>,
    pub exogenous: Vec<String>,
    pub equations: Vec<String>,
}

/// A block with its residual vector `F` and Jacobian `J` compiled into a
/// shared instruction tape.
#[derive(Debug, Clone)]
pub struct CompiledBlock {
    pub endogenous: Vec<String>,
    /// Canonical variable names (possibly lag-encoded) this block reads but
    /// does not solve for. Captured once at compile time; the period driver
    /// must resolve values in this exact order.
    pub exogenous_order: Vec<String>,
    pub equations: Vec<String>,
    program: Program,
    residual_outputs: Vec<usize>,
    jacobian_outputs: Vec<Vec<usize>>,
}

impl CompiledBlock {
    pub fn compile(members: &[BlockMember]) -> CompiledBlock {
        let endogenous: Vec<String> = members.iter().map(|m| m.endogenous.clone()).collect();
        let endogenous_set: HashSet<&str> = endogenous.iter().map(String::as_str).collect();

        let mut exogenous_set: BTreeSet<String> = BTreeSet::new();
        for member in members {
            for var in member.residual.variables() {
                if !endogenous_set.contains(var.as_str()) {
                    exogenous_set.insert(var);
                }
            }
        }
        let exogenous_order: Vec<String> = exogenous_set.into_iter().collect();

        let mut slots: HashMap<String, usize> = HashMap::new();
        for (i, name) in endogenous.iter().enumerate() {
            slots.insert(name.clone(), i);
        }
        for (j, name) in exogenous_order.iter().enumerate() {
            slots.insert(name.clone(), endogenous.len() + j);
        }

        let mut program = Program::default();
        let residual_outputs: Vec<usize> = members
            .iter()
            .map(|m| program.lower(&m.residual, &slots))
            .collect();

        let jacobian_outputs: Vec<Vec<usize>> = members
            .iter()
            .map(|m| {
                endogenous
                    .iter()
                    .map(|wrt| {
                        let derivative = m.residual.diff(wrt);
                        program.lower(&derivative, &slots)
                    })
                    .collect()
            })
            .collect();

        let equations = members.iter().map(|m| m.raw.clone()).collect();

        CompiledBlock {
            endogenous,
            exogenous_order,
            equations,
            program,
            residual_outputs,
            jacobian_outputs,
        }
    }

    pub fn len(&self) -> usize {
        self.endogenous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endogenous.is_empty()
    }

    fn combined(&self, endo: &[f64], exo: &[f64]) -> Vec<f64> {
        debug_assert_eq!(endo.len(), self.endogenous.len());
        debug_assert_eq!(exo.len(), self.exogenous_order.len());
        let mut vars = Vec::with_capacity(endo.len() + exo.len());
        vars.extend_from_slice(endo);
        vars.extend_from_slice(exo);
        vars
    }

    /// Evaluate the residual vector `F(endo; exo)`.
    pub fn eval_f(&self, endo: &[f64], exo: &[f64]) -> DVector<f64> {
        let vars = self.combined(endo, exo);
        let vals = self.program.eval(&vars);
        DVector::from_iterator(
            self.residual_outputs.len(),
            self.residual_outputs.iter().map(|&i| vals[i]),
        )
    }

    /// Evaluate the Jacobian `J(endo; exo)`, row `i` = d(residual_i)/d(endogenous_*).
    pub fn eval_jacobian(&self, endo: &[f64], exo: &[f64]) -> DMatrix<f64> {
        let vars = self.combined(endo, exo);
        let vals = self.program.eval(&vars);
        let n = self.endogenous.len();
        DMatrix::from_fn(n, n, |i, j| vals[self.jacobian_outputs[i][j]])
    }

    /// Structural summary for inspection/visualization, with exogenous names
    /// rendered back into user-facing lag notation (`y(-1)` rather than the
    /// canonical `y___LAG1_`).
    pub fn summary(&self, index: usize) -> BlockSummary {
        BlockSummary {
            index,
            endogenous: self.endogenous.clone(),
            exogenous: self.exogenous_order.iter().map(|n| render_lag(n)).collect(),
            equations: self.equations.clone(),
        }
    }
}

/// Render a canonical variable name back into user-facing lag notation,
/// e.g. `y___LAG1_` -> `y(-1)`. Current-period names pass through unchanged.
fn render_lag(name: &str) -> String {
    let (base, lag) = decode_lag(name);
    if lag == 0 {
        base
    } else {
        format!("{base}(-{lag})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var(name.to_string())
    }

    #[test]
    fn single_equation_block_evaluates_f_and_j() {
        // y = 2 * x -> residual y - 2*x, dF/dy = 1
        let residual = Expr::Sub(
            Box::new(var("y")),
            Box::new(Expr::Mul(Box::new(Expr::Const(2.0)), Box::new(var("x")))),
        );
        let member = BlockMember {
            raw: "y = 2 * x".to_string(),
            residual,
            endogenous: "y".to_string(),
        };
        let block = CompiledBlock::compile(&[member]);
        assert_eq!(block.exogenous_order, vec!["x".to_string()]);

        let f = block.eval_f(&[5.0], &[3.0]);
        assert_eq!(f[0], 5.0 - 6.0);

        let j = block.eval_jacobian(&[5.0], &[3.0]);
        assert_eq!(j[(0, 0)], 1.0);
    }

    #[test]
    fn two_cycle_block_shares_both_endogenous() {
        // a = b + 1 ; b = a - 1, a genuine mutual block.
        let res_a = Expr::Sub(
            Box::new(var("a")),
            Box::new(Expr::Add(Box::new(var("b")), Box::new(Expr::Const(1.0)))),
        );
        let res_b = Expr::Sub(
            Box::new(var("b")),
            Box::new(Expr::Sub(Box::new(var("a")), Box::new(Expr::Const(1.0)))),
        );
        let members = vec![
            BlockMember {
                raw: "a = b + 1".to_string(),
                residual: res_a,
                endogenous: "a".to_string(),
            },
            BlockMember {
                raw: "b = a - 1".to_string(),
                residual: res_b,
                endogenous: "b".to_string(),
            },
        ];
        let block = CompiledBlock::compile(&members);
        assert!(block.exogenous_order.is_empty());
        let j = block.eval_jacobian(&[1.0, 0.0], &[]);
        assert_eq!(j.nrows(), 2);
        assert_eq!(j.ncols(), 2);
    }

    #[test]
    fn summary_restores_lag_notation() {
        // y = y___LAG1_ + x -> exogenous should read "x" and "y(-1)".
        let residual = Expr::Sub(
            Box::new(var("y")),
            Box::new(Expr::Add(
                Box::new(var("y___LAG1_")),
                Box::new(var("x")),
            )),
        );
        let member = BlockMember {
            raw: "y = y(-1) + x".to_string(),
            residual,
            endogenous: "y".to_string(),
        };
        let block = CompiledBlock::compile(&[member]);
        let summary = block.summary(0);
        assert_eq!(summary.exogenous, vec!["x".to_string(), "y(-1)".to_string()]);
    }
}
