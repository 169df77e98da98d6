//! Expression trees, a small recursive-descent parser over lag-normalized
//! tokens, symbolic differentiation, and closure-based numeric codegen with
//! common-subexpression elimination (component C's tail, and the symbolic
//! backend called for by Design Notes §9: "build an explicit expression tree
//! ... lower it to a closure over a fixed argument vector").

use std::collections::{HashMap, HashSet};

use crate::lexer::NormToken;

/// A parsed algebraic expression. Variables are still string-named; they are
/// resolved to slot indices only when lowered into a [`Program`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Var(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    /// All variable names (canonical, lag-encoded where applicable)
    /// referenced anywhere in the expression.
    pub fn variables(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        collect_variables(self, &mut out);
        out
    }

    /// Symbolic derivative with respect to `var`, by the usual sum/product/
    /// quotient rules. Not algebraically simplified beyond constant folding
    /// done during [`Program`] lowering.
    pub fn diff(&self, var: &str) -> Expr {
        match self {
            Expr::Const(_) => Expr::Const(0.0),
            Expr::Var(name) => Expr::Const(if name == var { 1.0 } else { 0.0 }),
            Expr::Neg(a) => Expr::Neg(Box::new(a.diff(var))),
            Expr::Add(a, b) => Expr::Add(Box::new(a.diff(var)), Box::new(b.diff(var))),
            Expr::Sub(a, b) => Expr::Sub(Box::new(a.diff(var)), Box::new(b.diff(var))),
            Expr::Mul(a, b) => Expr::Add(
                Box::new(Expr::Mul(Box::new(a.diff(var)), b.clone())),
                Box::new(Expr::Mul(a.clone(), Box::new(b.diff(var)))),
            ),
            Expr::Div(a, b) => Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(Box::new(a.diff(var)), b.clone())),
                    Box::new(Expr::Mul(a.clone(), Box::new(b.diff(var)))),
                )),
                Box::new(Expr::Mul(b.clone(), b.clone())),
            ),
        }
    }
}

fn collect_variables(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::Const(_) => {}
        Expr::Var(name) => {
            out.insert(name.clone());
        }
        Expr::Neg(a) => collect_variables(a, out),
        Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
            collect_variables(a, out);
            collect_variables(b, out);
        }
    }
}

struct Parser<'a> {
    tokens: &'a [NormToken],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&NormToken> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&NormToken> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut node = self.term()?;
        loop {
            match self.peek() {
                Some(NormToken::Plus) => {
                    self.pos += 1;
                    node = Expr::Add(Box::new(node), Box::new(self.term()?));
                }
                Some(NormToken::Minus) => {
                    self.pos += 1;
                    node = Expr::Sub(Box::new(node), Box::new(self.term()?));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut node = self.factor()?;
        loop {
            match self.peek() {
                Some(NormToken::Star) => {
                    self.pos += 1;
                    node = Expr::Mul(Box::new(node), Box::new(self.factor()?));
                }
                Some(NormToken::Slash) => {
                    self.pos += 1;
                    node = Expr::Div(Box::new(node), Box::new(self.factor()?));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn factor(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(NormToken::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.factor()?)))
            }
            Some(NormToken::Plus) => {
                self.pos += 1;
                self.factor()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.bump().cloned() {
            Some(NormToken::Number(v)) => Ok(Expr::Const(v)),
            Some(NormToken::Ident(name)) => Ok(Expr::Var(name)),
            Some(NormToken::LParen) => {
                let node = self.expr()?;
                match self.bump() {
                    Some(NormToken::RParen) => Ok(node),
                    other => Err(format!("expected ')', found {other:?}")),
                }
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

/// Split `tokens` on the single `=` and parse each side as an expression.
/// Returns `Err` if there is not exactly one `=` or either side fails to
/// parse as a complete expression.
pub fn parse_equation(tokens: &[NormToken]) -> Result<(Expr, Expr), String> {
    let eq_positions: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == NormToken::Equals)
        .map(|(i, _)| i)
        .collect();
    if eq_positions.len() != 1 {
        return Err(format!(
            "equation must contain exactly one '=', found {}",
            eq_positions.len()
        ));
    }
    let eq_pos = eq_positions[0];

    let mut lhs_parser = Parser {
        tokens: &tokens[..eq_pos],
        pos: 0,
    };
    let lhs = lhs_parser.expr()?;
    if lhs_parser.pos != lhs_parser.tokens.len() {
        return Err("unexpected trailing tokens on left-hand side".to_string());
    }

    let mut rhs_parser = Parser {
        tokens: &tokens[eq_pos + 1..],
        pos: 0,
    };
    let rhs = rhs_parser.expr()?;
    if rhs_parser.pos != rhs_parser.tokens.len() {
        return Err("unexpected trailing tokens on right-hand side".to_string());
    }

    Ok((lhs, rhs))
}

/// One hash-consed instruction in a [`Program`]. Constants are stored by bit
/// pattern so the whole enum can be used as a `HashMap` key for CSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Instr {
    Const(u64),
    Var(usize),
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Div(usize, usize),
    Neg(usize),
}

/// A flat, hash-consed instruction tape shared by every residual and every
/// Jacobian entry compiled for a block. Lowering two structurally identical
/// subexpressions (e.g. `x * y` appearing in several equations) always
/// yields the same instruction index — the common-subexpression elimination
/// the spec calls for.
#[derive(Debug, Default, Clone)]
pub struct Program {
    instrs: Vec<Instr>,
    cache: HashMap<Instr, usize>,
}

impl Program {
    fn push(&mut self, instr: Instr) -> usize {
        if let Some(&idx) = self.cache.get(&instr) {
            return idx;
        }
        let idx = self.instrs.len();
        self.instrs.push(instr);
        self.cache.insert(instr, idx);
        idx
    }

    fn konst(&mut self, v: f64) -> usize {
        self.push(Instr::Const(v.to_bits()))
    }

    fn var(&mut self, slot: usize) -> usize {
        self.push(Instr::Var(slot))
    }

    /// Lower an [`Expr`] into this program, resolving variable names through
    /// `slots`, and return the instruction index holding its value.
    ///
    /// Folds `x + 0`, `x * 1`, `x * 0`, and constant-constant operations
    /// eagerly so the instruction tape doesn't carry dead arithmetic.
    pub fn lower(&mut self, expr: &Expr, slots: &HashMap<String, usize>) -> usize {
        match expr {
            Expr::Const(v) => self.konst(*v),
            Expr::Var(name) => {
                let slot = *slots
                    .get(name)
                    .unwrap_or_else(|| panic!("variable '{name}' has no assigned slot"));
                self.var(slot)
            }
            Expr::Neg(a) => {
                let a = self.lower(a, slots);
                if let Instr::Const(bits) = self.instrs[a] {
                    return self.konst(-f64::from_bits(bits));
                }
                self.push(Instr::Neg(a))
            }
            Expr::Add(a, b) => {
                let a = self.lower(a, slots);
                let b = self.lower(b, slots);
                self.fold_binop(Instr::Add(a, b), a, b, |x, y| x + y)
            }
            Expr::Sub(a, b) => {
                let a = self.lower(a, slots);
                let b = self.lower(b, slots);
                self.fold_binop(Instr::Sub(a, b), a, b, |x, y| x - y)
            }
            Expr::Mul(a, b) => {
                let a = self.lower(a, slots);
                let b = self.lower(b, slots);
                if self.is_const(a, 0.0) || self.is_const(b, 0.0) {
                    return self.konst(0.0);
                }
                if self.is_const(a, 1.0) {
                    return b;
                }
                if self.is_const(b, 1.0) {
                    return a;
                }
                self.fold_binop(Instr::Mul(a, b), a, b, |x, y| x * y)
            }
            Expr::Div(a, b) => {
                let a = self.lower(a, slots);
                let b = self.lower(b, slots);
                if self.is_const(b, 1.0) {
                    return a;
                }
                self.fold_binop(Instr::Div(a, b), a, b, |x, y| x / y)
            }
        }
    }

    fn is_const(&self, idx: usize, v: f64) -> bool {
        matches!(self.instrs[idx], Instr::Const(bits) if f64::from_bits(bits) == v)
    }

    fn fold_binop(
        &mut self,
        instr: Instr,
        a: usize,
        b: usize,
        f: impl Fn(f64, f64) -> f64,
    ) -> usize {
        if let (Instr::Const(ab), Instr::Const(bb)) = (self.instrs[a], self.instrs[b]) {
            return self.konst(f(f64::from_bits(ab), f64::from_bits(bb)));
        }
        self.push(instr)
    }

    /// Evaluate every instruction in the tape given the slot values in
    /// `vars`. Returns one value per instruction; callers read out the
    /// indices they care about.
    pub fn eval(&self, vars: &[f64]) -> Vec<f64> {
        let mut vals = vec![0.0_f64; self.instrs.len()];
        for (i, instr) in self.instrs.iter().enumerate() {
            vals[i] = match *instr {
                Instr::Const(bits) => f64::from_bits(bits),
                Instr::Var(slot) => vars[slot],
                Instr::Add(a, b) => vals[a] + vals[b],
                Instr::Sub(a, b) => vals[a] - vals[b],
                Instr::Mul(a, b) => vals[a] * vals[b],
                Instr::Div(a, b) => vals[a] / vals[b],
                Instr::Neg(a) => -vals[a],
            };
        }
        vals
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::analyze_equation;

    #[test]
    fn parses_cascade_equation() {
        let analyzed = analyze_equation("y=2*x+1").unwrap();
        let (lhs, rhs) = parse_equation(&analyzed.tokens).unwrap();
        assert_eq!(lhs, Expr::Var("y".to_string()));
        assert!(rhs.variables().contains("x"));
    }

    #[test]
    fn differentiates_product_rule() {
        let x = Expr::Var("x".to_string());
        let y = Expr::Var("y".to_string());
        let prod = Expr::Mul(Box::new(x.clone()), Box::new(y.clone()));
        let d = prod.diff("x");
        let mut slots = HashMap::new();
        slots.insert("x".to_string(), 0);
        slots.insert("y".to_string(), 1);
        let mut prog = Program::default();
        let idx = prog.lower(&d, &slots);
        let vals = prog.eval(&[3.0, 5.0]);
        assert_eq!(vals[idx], 5.0);
    }

    #[test]
    fn cse_deduplicates_shared_subexpression() {
        let x = Expr::Var("x".to_string());
        let y = Expr::Var("y".to_string());
        let shared = Expr::Mul(Box::new(x.clone()), Box::new(y.clone()));
        let lhs = Expr::Add(Box::new(shared.clone()), Box::new(Expr::Const(1.0)));
        let rhs = Expr::Sub(Box::new(shared), Box::new(Expr::Const(1.0)));

        let mut slots = HashMap::new();
        slots.insert("x".to_string(), 0);
        slots.insert("y".to_string(), 1);
        let mut prog = Program::default();
        prog.lower(&lhs, &slots);
        prog.lower(&rhs, &slots);

        // A naive lowering of both trees independently would carry two
        // `Mul(x, y)` instructions; the shared program must carry exactly one.
        let mul_count = (0..prog.len())
            .filter(|&i| matches!(prog.instrs[i], Instr::Mul(_, _)))
            .count();
        assert_eq!(mul_count, 1);
    }
}
