//! Equation lexer and lag normalizer (component A).
//!
//! Tokenizes with `logos`, then runs a single left-to-right merge pass that
//! folds an `Ident LParen Minus Number RParen` run into one canonical lagged
//! identifier, tracking the model's `max_lag` along the way. This reproduces
//! the lexer state machine from the original implementation
//! (`examples/original_source/src/model_solver.py::_analyze_eqn`) while using
//! the corpus's usual lexing idiom instead of a hand-rolled character loop.

use std::collections::HashMap;

use logos::Logos;
use miette::SourceSpan;

use crate::error::ModelError;

/// Sentinel marking a canonical lagged variable name. Must never appear in a
/// legal user identifier.
pub const LAG_SENTINEL: &str = "___LAG";

/// Encode `(base, lag)` into a canonical name. `lag == 0` is the identity
/// encoding (current-period references use the bare name).
pub fn encode_lag(base: &str, lag: i64) -> String {
    if lag == 0 {
        base.to_string()
    } else {
        format!("{base}{LAG_SENTINEL}{lag}_")
    }
}

/// Decode a canonical name into `(base, lag)`. Names without the sentinel
/// decode to lag 0, so this function also serves unlagged exogenous lookups.
pub fn decode_lag(name: &str) -> (String, i64) {
    if let Some(idx) = name.find(LAG_SENTINEL) {
        let base = &name[..idx];
        let rest = &name[idx + LAG_SENTINEL.len()..];
        if let Some(k_str) = rest.strip_suffix('_') {
            if let Ok(k) = k_str.parse::<i64>() {
                return (base.to_string(), k);
            }
        }
    }
    (name.to_string(), 0)
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
enum RawToken {
    #[regex(r"[A-Za-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("=")]
    Equals,
}

/// A token after lag-merging, ready for [`crate::expr`] to parse.
#[derive(Debug, Clone, PartialEq)]
pub enum NormToken {
    Ident(String),
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Equals,
}

impl NormToken {
    fn render(&self) -> String {
        match self {
            NormToken::Ident(s) => s.clone(),
            NormToken::Number(v) => v.to_string(),
            NormToken::Plus => "+".to_string(),
            NormToken::Minus => "-".to_string(),
            NormToken::Star => "*".to_string(),
            NormToken::Slash => "/".to_string(),
            NormToken::LParen => "(".to_string(),
            NormToken::RParen => ")".to_string(),
            NormToken::Equals => "=".to_string(),
        }
    }
}

/// One equation after lexing and lag normalization (§3 "Equation (analyzed)").
#[derive(Debug, Clone)]
pub struct AnalyzedEquation {
    pub raw: String,
    pub rewritten: String,
    pub tokens: Vec<NormToken>,
    /// token text -> canonical name, for every variable reference.
    pub var_mapping: HashMap<String, String>,
    /// canonical lagged name -> (base variable, lag).
    pub lag_mapping: HashMap<String, (String, i64)>,
    pub max_lag: i64,
}

fn malformed(src: &str, start: usize, end: usize, message: impl Into<String>) -> ModelError {
    ModelError::MalformedEquation {
        src: src.to_string(),
        span: SourceSpan::new(start.into(), end.saturating_sub(start)),
        message: message.into(),
    }
}

/// Lex one raw equation string and normalize lag notation.
pub fn analyze_equation(raw: &str) -> Result<AnalyzedEquation, ModelError> {
    if raw.trim().is_empty() {
        return Err(ModelError::BlankInput);
    }
    let src = raw.to_lowercase();

    let mut spanned: Vec<(RawToken, std::ops::Range<usize>)> = Vec::new();
    let mut lexer = RawToken::lexer(&src);
    while let Some(tok) = lexer.next() {
        match tok {
            Ok(t) => spanned.push((t, lexer.span())),
            Err(()) => {
                return Err(malformed(
                    &src,
                    lexer.span().start,
                    lexer.span().end,
                    "unrecognized character",
                ));
            }
        }
    }

    let sentinel_lower = LAG_SENTINEL.to_lowercase();
    for (tok, span) in &spanned {
        if let RawToken::Ident(name) = tok {
            if name.contains(&sentinel_lower) {
                return Err(ModelError::LagCollision {
                    token: src[span.clone()].to_string(),
                });
            }
        }
    }

    let mut tokens = Vec::new();
    let mut var_mapping = HashMap::new();
    let mut lag_mapping = HashMap::new();
    let mut max_lag: i64 = 0;

    let n = spanned.len();
    let mut i = 0usize;
    while i < n {
        let (tok, span) = &spanned[i];
        match tok {
            RawToken::Ident(name) => {
                let next_is_paren = spanned.get(i + 1).map(|(t, _)| t) == Some(&RawToken::LParen);
                if next_is_paren {
                    let has_minus = spanned.get(i + 2).map(|(t, _)| t) == Some(&RawToken::Minus);
                    let (num_str, rparen_ok) = if has_minus {
                        let num = spanned.get(i + 3).and_then(|(t, s)| match t {
                            RawToken::Number(n) => Some((n.clone(), s.clone())),
                            _ => None,
                        });
                        let rparen = spanned.get(i + 4).map(|(t, _)| t) == Some(&RawToken::RParen);
                        (num, rparen)
                    } else {
                        (None, false)
                    };

                    let (num_str, num_span) = match num_str {
                        Some((s, sp)) if rparen_ok => (s, sp),
                        _ => {
                            let end = spanned
                                .get(i + 4)
                                .map(|(_, s)| s.end)
                                .unwrap_or(span.end);
                            return Err(malformed(
                                &src,
                                span.start,
                                end,
                                "malformed lag: expected `(-k)` with k a positive integer",
                            ));
                        }
                    };

                    if num_str.contains('.') || num_str.contains('e') || num_str.contains('E') {
                        return Err(malformed(
                            &src,
                            span.start,
                            num_span.end,
                            "lag must be a positive integer",
                        ));
                    }
                    let lag: i64 = num_str.parse().map_err(|_| {
                        malformed(&src, span.start, num_span.end, "lag is not an integer")
                    })?;
                    if lag < 1 {
                        return Err(malformed(
                            &src,
                            span.start,
                            num_span.end,
                            "lag must be a positive integer (k >= 1)",
                        ));
                    }

                    let canonical = encode_lag(name, lag);
                    let raw_form = src[span.start..spanned[i + 4].1.end].to_string();
                    var_mapping.insert(raw_form, canonical.clone());
                    var_mapping.insert(canonical.clone(), name.clone());
                    lag_mapping.insert(canonical.clone(), (name.clone(), lag));
                    max_lag = max_lag.max(lag);

                    tokens.push(NormToken::Ident(canonical));
                    i += 5;
                    continue;
                }

                var_mapping.insert(name.clone(), name.clone());
                tokens.push(NormToken::Ident(name.clone()));
                i += 1;
            }
            RawToken::Number(s) => {
                let v: f64 = s
                    .parse()
                    .map_err(|_| malformed(&src, span.start, span.end, "invalid numeric literal"))?;
                tokens.push(NormToken::Number(v));
                i += 1;
            }
            RawToken::Plus => {
                tokens.push(NormToken::Plus);
                i += 1;
            }
            RawToken::Minus => {
                tokens.push(NormToken::Minus);
                i += 1;
            }
            RawToken::Star => {
                tokens.push(NormToken::Star);
                i += 1;
            }
            RawToken::Slash => {
                tokens.push(NormToken::Slash);
                i += 1;
            }
            RawToken::LParen => {
                tokens.push(NormToken::LParen);
                i += 1;
            }
            RawToken::RParen => {
                tokens.push(NormToken::RParen);
                i += 1;
            }
            RawToken::Equals => {
                tokens.push(NormToken::Equals);
                i += 1;
            }
        }
    }

    let rewritten = tokens
        .iter()
        .map(NormToken::render)
        .collect::<Vec<_>>()
        .join(" ");

    Ok(AnalyzedEquation {
        raw: src,
        rewritten,
        tokens,
        var_mapping,
        lag_mapping,
        max_lag,
    })
}
