//! # Allocation Optimizer
//!
//! Splits an input amount across several candidate routes to maximise total output.
//!
//! The split is greedy over `split_steps` equal increments (the last increment takes
//! the remainder of the integer division). Each increment goes to the route with the
//! largest marginal output `simulate(route, current + increment) - simulate(route, current)`.
//! Constant-product curves are concave in their input, so marginal output never grows
//! and the greedy walk converges on the best allocation over the increment grid.

use ethers::prelude::U256;
use tracing::debug;

use crate::errors::QuoteError;
use crate::router::Route;
use crate::simulator::TradeSimulator;

/// Default number of greedy increments.
pub const DEFAULT_SPLIT_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteQuote {
    pub route: Route,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// One route's share of a split quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub route: Route,
    pub amount_in: U256,
    pub amount_out: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Quote {
    Single(RouteQuote),
    Split {
        allocations: Vec<Allocation>,
        final_amount_out: U256,
    },
}

impl Quote {
    pub fn amount_out(&self) -> U256 {
        match self {
            Quote::Single(q) => q.amount_out,
            Quote::Split { final_amount_out, .. } => *final_amount_out,
        }
    }

    pub fn amount_in(&self) -> U256 {
        match self {
            Quote::Single(q) => q.amount_in,
            Quote::Split { allocations, .. } => allocations
                .iter()
                .fold(U256::zero(), |acc, a| acc + a.amount_in),
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, Quote::Split { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AllocationOptimizer {
    simulator: TradeSimulator,
    split_steps: usize,
    max_candidate_routes: usize,
}

impl AllocationOptimizer {
    pub fn new(simulator: TradeSimulator) -> Self {
        Self {
            simulator,
            split_steps: DEFAULT_SPLIT_STEPS,
            max_candidate_routes: 0,
        }
    }

    /// Set the number of greedy increments (minimum 1)
    pub fn with_split_steps(mut self, split_steps: usize) -> Self {
        self.split_steps = split_steps.max(1);
        self
    }

    /// Keep only the best `max` routes (by full-amount output) before splitting. 0 keeps all.
    pub fn with_max_candidate_routes(mut self, max: usize) -> Self {
        self.max_candidate_routes = max;
        self
    }

    pub fn simulator(&self) -> &TradeSimulator {
        &self.simulator
    }

    /// Best quote for `total_amount_in` over `routes`.
    pub fn allocate(&self, routes: &[Route], total_amount_in: U256) -> Result<Quote, QuoteError> {
        if routes.is_empty() {
            return Err(QuoteError::NoRouteFound);
        }

        if routes.len() == 1 {
            let route = &routes[0];
            let amount_out = self
                .simulator
                .simulate(route, total_amount_in)
                .ok_or(QuoteError::SimulationInfeasible)?;
            return Ok(Quote::Single(RouteQuote {
                route: route.clone(),
                amount_in: total_amount_in,
                amount_out,
            }));
        }

        let steps = self.split_steps;
        let increment = total_amount_in / U256::from(steps);
        if increment.is_zero() {
            // Too small to split: the whole amount goes to the first usable route.
            return routes
                .iter()
                .find_map(|route| {
                    self.simulator
                        .simulate(route, total_amount_in)
                        .map(|amount_out| {
                            Quote::Single(RouteQuote {
                                route: route.clone(),
                                amount_in: total_amount_in,
                                amount_out,
                            })
                        })
                })
                .ok_or(QuoteError::SimulationInfeasible);
        }

        let candidates = self.rank_candidates(routes, total_amount_in);
        let best_single = match candidates.iter().max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0))) {
            Some((route, out)) => Quote::Single(RouteQuote {
                route: (*route).clone(),
                amount_in: total_amount_in,
                amount_out: *out,
            }),
            None => return Err(QuoteError::SimulationInfeasible),
        };
        if candidates.len() == 1 {
            return Ok(best_single);
        }

        let split = self.greedy_split(&candidates, total_amount_in, increment, steps)?;

        // Integer flooring can bend the curves by a unit or two; never return a
        // split that is worse than simply taking the best single route.
        if split.amount_out() < best_single.amount_out() {
            return Ok(best_single);
        }
        Ok(split)
    }

    /// Feasible routes sorted by their full-amount output, best first, truncated to the
    /// configured candidate limit.
    fn rank_candidates<'a>(&self, routes: &'a [Route], amount: U256) -> Vec<(&'a Route, U256)> {
        let mut ranked: Vec<(usize, &Route, U256)> = routes
            .iter()
            .enumerate()
            .filter_map(|(i, r)| self.simulator.simulate(r, amount).map(|out| (i, r, out)))
            .collect();
        ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
        if self.max_candidate_routes > 0 {
            ranked.truncate(self.max_candidate_routes);
        }
        // restore caller order so ties during the split favour earlier routes
        ranked.sort_by_key(|(i, _, _)| *i);
        ranked.into_iter().map(|(_, r, out)| (r, out)).collect()
    }

    fn greedy_split(
        &self,
        candidates: &[(&Route, U256)],
        total: U256,
        increment: U256,
        steps: usize,
    ) -> Result<Quote, QuoteError> {
        let n = candidates.len();
        let mut allocated = vec![U256::zero(); n];
        let mut outputs = vec![U256::zero(); n];
        let mut usable = vec![true; n];
        let last_increment = total - increment * U256::from(steps - 1);

        for step in 0..steps {
            let chunk = if step == steps - 1 { last_increment } else { increment };
            let mut best: Option<(usize, U256, U256)> = None;

            for (i, (route, _)) in candidates.iter().enumerate() {
                if !usable[i] {
                    continue;
                }
                let candidate_out = match self.simulator.simulate(route, allocated[i] + chunk) {
                    Some(out) => out,
                    None => {
                        usable[i] = false;
                        continue;
                    }
                };
                let marginal = candidate_out.saturating_sub(outputs[i]);
                if best.map_or(true, |(_, m, _)| marginal > m) {
                    best = Some((i, marginal, candidate_out));
                }
            }

            let (winner, _, out) = best.ok_or(QuoteError::SimulationInfeasible)?;
            allocated[winner] += chunk;
            outputs[winner] = out;
        }

        let mut allocations: Vec<Allocation> = candidates
            .iter()
            .enumerate()
            .filter(|(i, _)| !allocated[*i].is_zero())
            .map(|(i, (route, _))| Allocation {
                route: (*route).clone(),
                amount_in: allocated[i],
                amount_out: outputs[i],
            })
            .collect();

        debug!(
            "Greedy split of {} over {} routes used {} routes",
            total,
            n,
            allocations.len()
        );

        if allocations.len() == 1 {
            let only = allocations.remove(0);
            return Ok(Quote::Single(RouteQuote {
                route: only.route,
                amount_in: only.amount_in,
                amount_out: only.amount_out,
            }));
        }

        let final_amount_out = allocations
            .iter()
            .fold(U256::zero(), |acc, a| acc + a.amount_out);
        Ok(Quote::Split {
            allocations,
            final_amount_out,
        })
    }
}
