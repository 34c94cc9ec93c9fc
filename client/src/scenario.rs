//! Headless claim scenarios for driving the client without a UI.
//!
//! The presentation layer is a collaborator, not part of the engine, so
//! the client binary exercises the protocol through scripted behaviors
//! instead of mouse clicks. Each scenario proposes the next cell to claim
//! based on the current reconciled view; it never claims a cell the view
//! already shows as owned.

use crate::reconcile::ClientView;
use clap::ValueEnum;
use rand::seq::IteratorRandom;
use shared::{CELL_COUNT, UNCLAIMED};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Observe only, never claim.
    Idle,
    /// Claim a random locally-unclaimed cell each interval.
    Random,
    /// Claim cells in row-major order.
    Sweep,
}

/// Picks claim targets according to the configured scenario.
#[derive(Debug)]
pub struct ScenarioDriver {
    scenario: Scenario,
}

impl ScenarioDriver {
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    /// Next cell to claim, or `None` when the scenario is passive or the
    /// view shows no unclaimed cells left.
    pub fn next_claim(&self, view: &ClientView) -> Option<u16> {
        if view.is_finished() {
            return None;
        }

        let unclaimed = (0..CELL_COUNT as u16)
            .filter(|&cell| view.grid().owner(cell) == Some(UNCLAIMED));

        match self.scenario {
            Scenario::Idle => None,
            Scenario::Sweep => unclaimed.min(),
            Scenario::Random => {
                let mut rng = rand::thread_rng();
                unclaimed.choose(&mut rng)
            }
        }
    }
}
