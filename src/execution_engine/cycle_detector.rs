//! Brent's cycle detector over the step stream
//!
//! Watches the append-only sequence of (actor, tool, outcome) records
//! and detects cycles of any length in O(1) amortized time with Brent's
//! power-of-two bookkeeping. A candidate period found by the hare /
//! tortoise comparison only fires once the stream actually contains two
//! full periods plus the closing observation, which rules out
//! coincidental signature matches.

use crate::reasoning_state::Actor;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over a byte slice; stable across processes
pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// A detected cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleInfo {
    /// Cycle period
    pub length: usize,
    /// Tools in one period, oldest first
    pub tools: Vec<String>,
}

/// Streaming cycle detector (Brent's algorithm)
#[derive(Debug, Default)]
pub struct CycleDetector {
    signatures: Vec<u64>,
    tools: Vec<String>,
    tortoise: usize,
    power: usize,
    lambda: usize,
    /// Candidate period awaiting a full double-cycle confirmation
    pending: Option<usize>,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps observed since the last reset
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Record one step; returns the cycle when one closes
    pub fn record(&mut self, actor: Actor, tool: &str, success: bool) -> Option<CycleInfo> {
        let signature = step_signature(actor, tool, success);
        self.signatures.push(signature);
        self.tools.push(tool.to_string());
        let i = self.signatures.len() - 1;

        if i == 0 {
            self.tortoise = 0;
            self.power = 1;
            self.lambda = 0;
            self.pending = None;
            return None;
        }

        self.lambda += 1;

        // Hare meets tortoise: candidate period is the distance between them
        if self.signatures[i] == self.signatures[self.tortoise] {
            self.pending = Some(i - self.tortoise);
        }

        if let Some(length) = self.pending {
            if self.confirmed(i, length) {
                let cycle = CycleInfo {
                    length,
                    tools: self.tools[i + 1 - length..=i].to_vec(),
                };
                self.reset();
                return Some(cycle);
            }
        }

        // Brent teleport: move the tortoise to the hare, double the window
        if self.lambda == self.power {
            self.tortoise = i;
            self.power *= 2;
            self.lambda = 0;
        }

        None
    }

    /// True when the last `2 * length` entries hold period `length` and
    /// the closing observation exists (`i >= 2 * length`)
    fn confirmed(&self, i: usize, length: usize) -> bool {
        if length == 0 || i < 2 * length {
            return false;
        }
        (i + 1 - length..=i).all(|j| self.signatures[j] == self.signatures[j - length])
    }

    /// Clear all detector state
    pub fn reset(&mut self) {
        self.signatures.clear();
        self.tools.clear();
        self.tortoise = 0;
        self.power = 1;
        self.lambda = 0;
        self.pending = None;
    }
}

fn step_signature(actor: Actor, tool: &str, success: bool) -> u64 {
    let mut bytes = Vec::with_capacity(tool.len() + 4);
    bytes.push(match actor {
        Actor::Router => 0,
        Actor::MainAgent => 1,
    });
    bytes.push(0x1f);
    bytes.extend_from_slice(tool.as_bytes());
    bytes.push(0x1f);
    bytes.push(u8::from(success));
    fnv1a_64(&bytes)
}
