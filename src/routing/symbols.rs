//! Symbol resolution — free-text name to qualified symbol id
//!
//! Five strategies, tried in order; the first success wins. Results are
//! cached per session so a repeated lookup never changes its answer
//! within the session.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::GraphError;
use crate::metrics;

/// Symbol kind as reported by the code graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Struct,
    Trait,
    Module,
    Other,
}

impl SymbolKind {
    /// Function-like kinds are preferred during disambiguation
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

/// One symbol known to the code graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub line: u32,
}

/// Bounded search surface of the code graph
#[async_trait]
pub trait SymbolIndex: Send + Sync {
    /// Exact id lookup
    async fn get(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<Option<Symbol>, GraphError>;

    /// All symbols with exactly this name
    async fn find_by_name(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<Vec<Symbol>, GraphError>;

    /// Symbols whose name contains the fragment, bounded
    async fn search_substring(
        &self,
        cancel: &CancellationToken,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<Symbol>, GraphError>;

    /// Fuzzy name search, bounded
    async fn search_fuzzy(
        &self,
        cancel: &CancellationToken,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Symbol>, GraphError>;
}

/// Successful resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub symbol: Symbol,
    /// Always within [0.0, 1.0]
    pub confidence: f64,
    /// Strategy tag: exact, name, name_disambiguated, name_ambiguous,
    /// substring, fuzzy, fuzzy_ambiguous, name_fallback
    pub strategy: &'static str,
}

/// What resolution produced
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Resolved(Resolution),
    /// Nothing resolved; "did you mean" candidates (at most 3)
    Suggestions(Vec<Symbol>),
}

const SUBSTRING_SEARCH_LIMIT: usize = 25;
const FUZZY_SEARCH_LIMIT: usize = 10;

/// Resolver with a per-session cache
pub struct SymbolResolver {
    index: Arc<dyn SymbolIndex>,
    /// Keyed by `session_id:name`
    cache: DashMap<String, Resolution>,
}

impl SymbolResolver {
    pub fn new(index: Arc<dyn SymbolIndex>) -> Self {
        Self {
            index,
            cache: DashMap::new(),
        }
    }

    /// Resolve a free-text name within a session
    pub async fn resolve(
        &self,
        cancel: &CancellationToken,
        session_id: &str,
        name: &str,
    ) -> Result<ResolutionOutcome, GraphError> {
        let cache_key = format!("{}:{}", session_id, name);
        if let Some(cached) = self.cache.get(&cache_key) {
            metrics::record_symbol_cache_hit();
            return Ok(ResolutionOutcome::Resolved(cached.clone()));
        }
        metrics::record_symbol_cache_miss();

        let start = Instant::now();
        let outcome = self.resolve_uncached(cancel, name).await?;

        if let ResolutionOutcome::Resolved(resolution) = &outcome {
            metrics::record_symbol_resolution(
                resolution.strategy,
                resolution.confidence,
                start.elapsed(),
            );
            self.cache.insert(cache_key, resolution.clone());
        }
        Ok(outcome)
    }

    async fn resolve_uncached(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<ResolutionOutcome, GraphError> {
        // Strategy 1: the name is already a qualified id
        if let Some(symbol) = self.index.get(cancel, name).await? {
            return Ok(resolved(symbol, 1.0, "exact"));
        }

        // Strategy 2/3: exact-name lookup
        let mut name_fallback: Option<Symbol> = None;
        let by_name = self.index.find_by_name(cancel, name).await?;
        match by_name.len() {
            0 => {}
            1 => {
                let symbol = by_name.into_iter().next().unwrap();
                if symbol.kind.is_callable() {
                    return Ok(resolved(symbol, 0.95, "name"));
                }
                // Sole non-function match: held until everything
                // better has been tried
                name_fallback = Some(symbol);
            }
            _ => {
                if let Some(callable) = by_name.iter().find(|s| s.kind.is_callable()) {
                    return Ok(resolved(callable.clone(), 0.8, "name_disambiguated"));
                }
                return Ok(resolved(by_name.into_iter().next().unwrap(), 0.6, "name_ambiguous"));
            }
        }

        // Strategy 4: bounded substring scan
        let candidates = self
            .index
            .search_substring(cancel, name, SUBSTRING_SEARCH_LIMIT)
            .await?;
        if let Some(best) = best_substring_match(name, &candidates) {
            return Ok(ResolutionOutcome::Resolved(best));
        }

        // Strategy 5: fuzzy fallback
        let fuzzy = self
            .index
            .search_fuzzy(cancel, name, FUZZY_SEARCH_LIMIT)
            .await?;
        if let Some(callable) = fuzzy.iter().find(|s| s.kind.is_callable()) {
            return Ok(resolved(callable.clone(), 0.7, "fuzzy"));
        }

        // Strategy 6: the held exact-name match beats a fuzzy guess at
        // equal confidence
        if let Some(symbol) = name_fallback {
            return Ok(resolved(symbol, 0.5, "name_fallback"));
        }
        if let Some(first) = fuzzy.into_iter().next() {
            return Ok(resolved(first, 0.5, "fuzzy_ambiguous"));
        }

        // Strategy 7: nothing resolved — suggest
        let mut suggestions = self.index.search_fuzzy(cancel, name, 3).await?;
        suggestions.truncate(3);
        Ok(ResolutionOutcome::Suggestions(suggestions))
    }
}

fn resolved(symbol: Symbol, confidence: f64, strategy: &'static str) -> ResolutionOutcome {
    debug_assert!((0.0..=1.0).contains(&confidence));
    ResolutionOutcome::Resolved(Resolution {
        symbol,
        confidence,
        strategy,
    })
}

/// Score substring candidates: 0.75 base, +0.10 prefix, +0.05 callable
fn best_substring_match(fragment: &str, candidates: &[Symbol]) -> Option<Resolution> {
    candidates
        .iter()
        .map(|symbol| {
            let mut confidence = 0.75;
            if symbol.name.starts_with(fragment) {
                confidence += 0.10;
            }
            if symbol.kind.is_callable() {
                confidence += 0.05;
            }
            Resolution {
                symbol: symbol.clone(),
                confidence,
                strategy: "substring",
            }
        })
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// In-memory symbol index (for testing)
pub struct StaticSymbolIndex {
    symbols: Vec<Symbol>,
}

impl StaticSymbolIndex {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut chars = haystack.chars();
    needle
        .chars()
        .all(|n| chars.any(|h| h.eq_ignore_ascii_case(&n)))
}

#[async_trait]
impl SymbolIndex for StaticSymbolIndex {
    async fn get(
        &self,
        _cancel: &CancellationToken,
        id: &str,
    ) -> Result<Option<Symbol>, GraphError> {
        Ok(self.symbols.iter().find(|s| s.id == id).cloned())
    }

    async fn find_by_name(
        &self,
        _cancel: &CancellationToken,
        name: &str,
    ) -> Result<Vec<Symbol>, GraphError> {
        Ok(self
            .symbols
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }

    async fn search_substring(
        &self,
        _cancel: &CancellationToken,
        fragment: &str,
        limit: usize,
    ) -> Result<Vec<Symbol>, GraphError> {
        Ok(self
            .symbols
            .iter()
            .filter(|s| s.name.contains(fragment) && s.name != fragment)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search_fuzzy(
        &self,
        _cancel: &CancellationToken,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Symbol>, GraphError> {
        Ok(self
            .symbols
            .iter()
            .filter(|s| s.name != name && is_subsequence(name, &s.name))
            .take(limit)
            .cloned()
            .collect())
    }
}
