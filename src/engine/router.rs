// src/engine/router.rs
//
// Route discovery: enumerate every direct and two-hop path over the candidate
// tick spacings, quote them all in one batch, keep the best.
//
// Ordering of candidates is deterministic (direct by spacing order, then
// two-hop by intermediate, then hop-1 spacing, then hop-2 spacing); it is
// the final tie-break after amount, hop count and gas.

use std::collections::HashSet;
use std::sync::Arc;

use ethers::types::{Address, Bytes, U256};

use crate::chain::batch_client::BatchCallClient;
use crate::chain::path_codec::{decode_quote_response, encode_quote_call, QuoteReply, SwapPath};
use crate::chain::rpc::ReadCall;
use crate::error::{EngineError, EngineResult};
use crate::models::{Quote, RouteKind, RouteRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: SwapPath,
    pub kind: RouteKind,
}

/// Result of a quoting round.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// No candidate produced a usable reply (or there were no candidates).
    NoRoute,
    /// Replies came back, but every one quoted zero output.
    ZeroOutput,
    Found(Quote),
}

fn dedup<T: Copy + Eq + std::hash::Hash>(items: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    items.iter().copied().filter(|x| seen.insert(*x)).collect()
}

pub fn build_candidates(req: &RouteRequest) -> EngineResult<Vec<Candidate>> {
    if req.token_in == req.token_out {
        return Err(EngineError::InvalidPath("token_in and token_out are the same".into()));
    }
    if req.amount_in.is_zero() {
        return Err(EngineError::InvalidPath("amount_in must be positive".into()));
    }

    let spacings = dedup(&req.tick_spacings);
    let intermediates: Vec<Address> = dedup(&req.intermediates)
        .into_iter()
        .filter(|t| *t != req.token_in && *t != req.token_out)
        .collect();

    let mut candidates = Vec::with_capacity(spacings.len() * (1 + intermediates.len() * spacings.len()));
    for &s in &spacings {
        candidates.push(Candidate { path: SwapPath::new(&[req.token_in, req.token_out], &[s])?, kind: RouteKind::Direct });
    }
    for &mid in &intermediates {
        for &s1 in &spacings {
            for &s2 in &spacings {
                candidates.push(Candidate {
                    path: SwapPath::new(&[req.token_in, mid, req.token_out], &[s1, s2])?,
                    kind: RouteKind::MultiHop,
                });
            }
        }
    }
    Ok(candidates)
}

/// Strictly better: more output, then fewer hops, then lower gas when both are known.
fn is_better(challenger: &Quote, incumbent: &Quote) -> bool {
    if challenger.amount_out != incumbent.amount_out {
        return challenger.amount_out > incumbent.amount_out;
    }
    if challenger.hops() != incumbent.hops() {
        return challenger.hops() < incumbent.hops();
    }
    match (challenger.gas_estimate, incumbent.gas_estimate) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    }
}

/// A well-formed reply quoting zero output is `NoLiquidity`.
pub fn require_output(reply: QuoteReply) -> EngineResult<QuoteReply> {
    if reply.amount_out.is_zero() {
        return Err(EngineError::NoLiquidity);
    }
    Ok(reply)
}

/// Pair each candidate with its batch slot and pick the winner.
pub fn select_best(candidates: &[Candidate], replies: &[Option<Bytes>]) -> RouteOutcome {
    let mut answered = false;
    let mut best: Option<Quote> = None;

    for (candidate, slot) in candidates.iter().zip(replies) {
        let QuoteReply { amount_out, gas_estimate } = match decode_quote_response(slot.as_deref()).and_then(require_output)
        {
            Ok(reply) => reply,
            Err(EngineError::NoLiquidity) => {
                answered = true;
                continue;
            }
            Err(e) => {
                log::debug!("no quote for {:?} via {:?}: {}", candidate.kind, candidate.path.tick_spacings(), e);
                continue;
            }
        };
        answered = true;

        let quote = Quote {
            amount_out,
            path: candidate.path.tokens(),
            kind: candidate.kind,
            tick_spacings: candidate.path.tick_spacings(),
            gas_estimate,
        };
        match &best {
            Some(current) if !is_better(&quote, current) => {}
            _ => best = Some(quote),
        }
    }

    match best {
        Some(q) => RouteOutcome::Found(q),
        None if answered => RouteOutcome::ZeroOutput,
        None => RouteOutcome::NoRoute,
    }
}

pub struct RouteSelector {
    client: Arc<BatchCallClient>,
    quoter: Address,
}

impl RouteSelector {
    pub fn new(client: Arc<BatchCallClient>, quoter: Address) -> Self {
        Self { client, quoter }
    }

    /// Quote every candidate path in a single batch and return the best.
    pub async fn best_route(&self, req: &RouteRequest) -> EngineResult<RouteOutcome> {
        let candidates = build_candidates(req)?;
        if candidates.is_empty() {
            return Ok(RouteOutcome::NoRoute);
        }

        let calls = candidates
            .iter()
            .map(|c| Ok(ReadCall::new(self.quoter, encode_quote_call(&c.path.encode()?, req.amount_in))))
            .collect::<EngineResult<Vec<_>>>()?;

        log::debug!(
            "quoting {} candidates ({} direct) for {:?} -> {:?}",
            calls.len(),
            candidates.iter().filter(|c| c.kind == RouteKind::Direct).count(),
            req.token_in,
            req.token_out
        );
        let replies = self.client.batch_call(&calls).await;
        let outcome = select_best(&candidates, &replies);

        if let RouteOutcome::Found(q) = &outcome {
            log::info!("best route {:?} spacings {:?} amount_out {}", q.kind, q.tick_spacings, q.amount_out);
        }
        Ok(outcome)
    }
}

/// Amount in raw units from a decimal string, as received over the API.
pub fn parse_amount(raw: &str) -> EngineResult<U256> {
    U256::from_dec_str(raw.trim()).map_err(|e| EngineError::InvalidPath(format!("amount {:?}: {}", raw, e)))
}
