//! Bipartite equation/variable matching and dependency condensation
//! (component B).
//!
//! Each equation is assigned exactly one endogenous variable via
//! Hopcroft–Karp maximum bipartite matching, restricted to current-period
//! references (lagged references never compete for a match since their
//! canonical names carry the lag sentinel and so never equal a bare
//! endogenous name). The matched equations are then condensed into minimal
//! simultaneous blocks by building a dependency digraph over equations and
//! running Tarjan's SCC algorithm, producing blocks in topological order.
//!
//! Adapted from `src/ir/blt.rs`'s `HopcroftKarp`/`find_maximum_matching`/
//! `tarjan_scc`, restricted to this crate's current-period-only edge rule and
//! turned into a hard error on an incomplete matching rather than the
//! teacher's best-effort reassignment heuristic.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::ModelError;

const NIL: usize = usize::MAX;

/// Hopcroft–Karp maximum bipartite matching between equations (left) and
/// endogenous variables (right).
struct HopcroftKarp {
    n_eqs: usize,
    adj: Vec<Vec<usize>>,
    pair_eq: Vec<usize>,
    pair_var: Vec<usize>,
    dist: Vec<usize>,
}

impl HopcroftKarp {
    fn new(n_eqs: usize, n_vars: usize, adj: Vec<Vec<usize>>) -> Self {
        Self {
            n_eqs,
            adj,
            pair_eq: vec![NIL; n_eqs],
            pair_var: vec![NIL; n_vars],
            dist: vec![0; n_eqs + 1],
        }
    }

    fn max_matching(&mut self) -> usize {
        let mut matching = 0;
        while self.bfs() {
            for eq in 0..self.n_eqs {
                if self.pair_eq[eq] == NIL && self.dfs(eq) {
                    matching += 1;
                }
            }
        }
        matching
    }

    fn bfs(&mut self) -> bool {
        let mut queue = VecDeque::new();
        for eq in 0..self.n_eqs {
            if self.pair_eq[eq] == NIL {
                self.dist[eq] = 0;
                queue.push_back(eq);
            } else {
                self.dist[eq] = usize::MAX;
            }
        }
        self.dist[self.n_eqs] = usize::MAX;

        while let Some(eq) = queue.pop_front() {
            if self.dist[eq] < self.dist[self.n_eqs] {
                for &var in &self.adj[eq] {
                    let next_eq = self.pair_var[var];
                    let next_idx = if next_eq == NIL { self.n_eqs } else { next_eq };
                    if self.dist[next_idx] == usize::MAX {
                        self.dist[next_idx] = self.dist[eq] + 1;
                        if next_eq != NIL {
                            queue.push_back(next_eq);
                        }
                    }
                }
            }
        }
        self.dist[self.n_eqs] != usize::MAX
    }

    fn dfs(&mut self, eq: usize) -> bool {
        if eq == NIL {
            return true;
        }
        for i in 0..self.adj[eq].len() {
            let var = self.adj[eq][i];
            let next_eq = self.pair_var[var];
            let next_idx = if next_eq == NIL { self.n_eqs } else { next_eq };
            if self.dist[next_idx] == self.dist[eq] + 1 && self.dfs(next_eq) {
                self.pair_var[var] = eq;
                self.pair_eq[eq] = var;
                return true;
            }
        }
        self.dist[eq] = usize::MAX;
        false
    }
}

/// The outcome of matching equations to endogenous variables and condensing
/// them into minimal simultaneous blocks.
#[derive(Debug, Clone)]
pub struct Causalization {
    /// Equation indices in block-grouped topological order.
    pub equation_order: Vec<usize>,
    /// Each inner `Vec` is one simultaneous-solve block (an SCC); blocks
    /// themselves are in topological order. A block of length 1 is a
    /// recursive (non-simultaneous) equation.
    pub blocks: Vec<Vec<usize>>,
    /// equation index -> the endogenous variable it was matched to solve for.
    pub matching: HashMap<usize, String>,
}

/// Match every equation to exactly one endogenous variable and condense the
/// result into simultaneous blocks.
///
/// `current_period_refs[i]` is the set of canonical variable names equation
/// `i` references; only names that also appear in `endogenous` compete for a
/// match (lagged and exogenous references are invisible to the matching).
/// `lhs_hint[i]`, when `Some`, is preferred as `i`'s match if it is still
/// available — mirroring the teacher's "prefer the LHS variable" tie-break.
pub fn causalize(
    current_period_refs: &[HashSet<String>],
    lhs_hint: &[Option<String>],
    endogenous: &[String],
) -> Result<Causalization, ModelError> {
    let n = current_period_refs.len();

    let var_to_idx: HashMap<&str, usize> = endogenous
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut reverse_adj: Vec<Vec<usize>> = vec![Vec::new(); endogenous.len()];
    for (eq_idx, refs) in current_period_refs.iter().enumerate() {
        for var in refs {
            if let Some(&var_idx) = var_to_idx.get(var.as_str()) {
                adj[eq_idx].push(var_idx);
                reverse_adj[var_idx].push(eq_idx);
            }
        }
    }

    // Essential-assignment preprocessing: a variable reachable from only one
    // remaining equation must be matched to it, propagated to a fixed point.
    let mut forced_eq_to_var: HashMap<usize, usize> = HashMap::new();
    let mut forced_var_to_eq: HashMap<usize, usize> = HashMap::new();
    let mut changed = true;
    while changed {
        changed = false;
        for (var_idx, var_eqs) in reverse_adj.iter().enumerate() {
            if forced_var_to_eq.contains_key(&var_idx) {
                continue;
            }
            let available: Vec<usize> = var_eqs
                .iter()
                .filter(|eq| !forced_eq_to_var.contains_key(eq))
                .copied()
                .collect();
            if available.len() == 1 {
                let eq_idx = available[0];
                forced_eq_to_var.insert(eq_idx, var_idx);
                forced_var_to_eq.insert(var_idx, eq_idx);
                changed = true;
            }
        }
    }

    let mut adj_modified: Vec<Vec<usize>> = vec![Vec::new(); n];
    for eq_idx in 0..n {
        if let Some(&forced_var) = forced_eq_to_var.get(&eq_idx) {
            adj_modified[eq_idx] = vec![forced_var];
            continue;
        }
        let mut candidates: Vec<usize> = Vec::new();
        if let Some(hint) = &lhs_hint[eq_idx] {
            if let Some(&var_idx) = var_to_idx.get(hint.as_str()) {
                if !forced_var_to_eq.contains_key(&var_idx) {
                    candidates.push(var_idx);
                }
            }
        }
        for &var_idx in &adj[eq_idx] {
            if !forced_var_to_eq.contains_key(&var_idx) && !candidates.contains(&var_idx) {
                candidates.push(var_idx);
            }
        }
        adj_modified[eq_idx] = candidates;
    }

    let mut hk = HopcroftKarp::new(n, endogenous.len(), adj_modified);
    let matched = hk.max_matching();
    if matched != n {
        return Err(ModelError::StructuralSingularity {
            matched,
            total: n,
        });
    }

    let matching: HashMap<usize, String> = hk
        .pair_eq
        .iter()
        .enumerate()
        .map(|(eq_idx, &var_idx)| (eq_idx, endogenous[var_idx].clone()))
        .collect();

    let ordered = tarjan_condense(current_period_refs, &matching);
    let equation_order: Vec<usize> = ordered.iter().flatten().copied().collect();

    Ok(Causalization {
        equation_order,
        blocks: ordered,
        matching,
    })
}

struct TarjanState {
    index: usize,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    sccs: Vec<Vec<usize>>,
}

impl TarjanState {
    fn new(n: usize) -> Self {
        Self {
            index: 0,
            indices: vec![None; n],
            lowlinks: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            sccs: Vec::new(),
        }
    }

    fn strongconnect(&mut self, v: usize, graph: &[Vec<usize>]) {
        self.indices[v] = Some(self.index);
        self.lowlinks[v] = self.index;
        self.index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        for &w in &graph[v] {
            if self.indices[w].is_none() {
                self.strongconnect(w, graph);
                self.lowlinks[v] = self.lowlinks[v].min(self.lowlinks[w]);
            } else if self.on_stack[w] {
                self.lowlinks[v] = self.lowlinks[v].min(self.indices[w].unwrap());
            }
        }

        if self.lowlinks[v] == self.indices[v].unwrap() {
            let mut scc = Vec::new();
            loop {
                let w = self.stack.pop().unwrap();
                self.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            scc.reverse();
            self.sccs.push(scc);
        }
    }
}

/// Build the equation dependency digraph from the matching (equation `i`
/// depends on equation `j` if `i` references the variable `j` solves for)
/// and return its SCCs in topological order.
fn tarjan_condense(
    current_period_refs: &[HashSet<String>],
    matching: &HashMap<usize, String>,
) -> Vec<Vec<usize>> {
    let n = current_period_refs.len();
    let var_to_eq: HashMap<&str, usize> = matching
        .iter()
        .map(|(&eq, var)| (var.as_str(), eq))
        .collect();

    let mut graph: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, refs) in current_period_refs.iter().enumerate() {
        let my_var = matching.get(&i).map(String::as_str);
        for var in refs {
            if Some(var.as_str()) == my_var {
                continue;
            }
            if let Some(&j) = var_to_eq.get(var.as_str()) {
                if i != j {
                    graph[j].push(i);
                }
            }
        }
    }

    let mut state = TarjanState::new(n);
    for v in 0..n {
        if state.indices[v].is_none() {
            state.strongconnect(v, &graph);
        }
    }
    state.sccs.reverse();
    state.sccs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(vars: &[&str]) -> HashSet<String> {
        vars.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cascade_orders_topologically() {
        // eq0: y = x (matched to y), eq1: z = y + 1 (matched to z)
        let endogenous = vec!["y".to_string(), "z".to_string()];
        let refs_per_eq = vec![refs(&["y", "x"]), refs(&["z", "y"])];
        let lhs_hint = vec![Some("y".to_string()), Some("z".to_string())];
        let result = causalize(&refs_per_eq, &lhs_hint, &endogenous).unwrap();
        assert_eq!(result.blocks.len(), 2);
        assert_eq!(result.matching[&0], "y");
        assert_eq!(result.matching[&1], "z");
        assert_eq!(result.equation_order, vec![0, 1]);
    }

    #[test]
    fn mutual_dependency_forms_one_block() {
        // eq0: a = b + 1, eq1: b = a + 1 -- a genuine 2-cycle.
        let endogenous = vec!["a".to_string(), "b".to_string()];
        let refs_per_eq = vec![refs(&["a", "b"]), refs(&["b", "a"])];
        let lhs_hint = vec![Some("a".to_string()), Some("b".to_string())];
        let result = causalize(&refs_per_eq, &lhs_hint, &endogenous).unwrap();
        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.blocks[0].len(), 2);
    }

    #[test]
    fn incomplete_matching_is_structural_singularity() {
        // Both equations reference only "a"; "b" is never referenced at all.
        let endogenous = vec!["a".to_string(), "b".to_string()];
        let refs_per_eq = vec![refs(&["a"]), refs(&["a"])];
        let lhs_hint = vec![Some("a".to_string()), None];
        let err = causalize(&refs_per_eq, &lhs_hint, &endogenous).unwrap_err();
        assert!(matches!(err, ModelError::StructuralSingularity { .. }));
    }
}
