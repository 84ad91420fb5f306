//! A tank holding a single fluid at a time.

use rebar_utils::locks::SyncMutex;

use crate::{fluid::Fluid, network::FluidPredicate};

use super::FluidBlock;

/// Below this an amount is treated as zero.
const AMOUNT_EPSILON: f64 = 1.0e-6;

#[derive(Debug)]
struct TankState {
    fluid: Option<Fluid>,
    amount: f64,
    capacity: f64,
}

impl TankState {
    fn can_set_fluid(&self, amount: f64) -> bool {
        amount > -AMOUNT_EPSILON && amount < self.capacity + AMOUNT_EPSILON
    }

    fn set_fluid(&mut self, amount: f64) -> bool {
        if !self.can_set_fluid(amount) {
            return false;
        }
        let original = self.amount;
        self.amount = amount.max(0.0);
        if original > amount && amount < AMOUNT_EPSILON {
            // drained
            self.fluid = None;
            self.amount = 0.0;
        }
        true
    }
}

/// A tank that stores one fluid at a time, but can store any fluid it allows.
///
/// An empty tank asks for a full tank of anything it allows; once it holds a fluid
/// it only asks for more of that fluid. It offers its whole content to the
/// network and forgets its fluid type once drained.
pub struct FluidTank {
    state: SyncMutex<TankState>,
    allowed: Option<FluidPredicate>,
}

impl FluidTank {
    /// Creates an empty tank that accepts any fluid.
    #[must_use]
    pub fn new(capacity: f64) -> Self {
        Self {
            state: SyncMutex::new(TankState {
                fluid: None,
                amount: 0.0,
                capacity: capacity.max(0.0),
            }),
            allowed: None,
        }
    }

    /// Creates an empty tank that only accepts fluids matching `allowed`.
    #[must_use]
    pub fn with_allowed(capacity: f64, allowed: FluidPredicate) -> Self {
        Self {
            allowed: Some(allowed),
            ..Self::new(capacity)
        }
    }

    /// Creates a tank already holding `amount` of `fluid`.
    #[must_use]
    pub fn filled(capacity: f64, fluid: Fluid, amount: f64) -> Self {
        let tank = Self::new(capacity);
        {
            let mut state = tank.state.lock();
            let amount = amount.min(state.capacity);
            state.fluid = Some(fluid);
            state.set_fluid(amount);
        }
        tank
    }

    /// The fluid in the tank, if any.
    #[must_use]
    pub fn fluid_type(&self) -> Option<Fluid> {
        self.state.lock().fluid.clone()
    }

    /// The amount of fluid in the tank.
    #[must_use]
    pub fn fluid_amount(&self) -> f64 {
        self.state.lock().amount
    }

    /// The capacity of the tank.
    #[must_use]
    pub fn fluid_capacity(&self) -> f64 {
        self.state.lock().capacity
    }

    /// How much more fluid fits.
    #[must_use]
    pub fn fluid_space_remaining(&self) -> f64 {
        let state = self.state.lock();
        state.capacity - state.amount
    }

    /// Sets the type of fluid in the tank without touching the amount.
    pub fn set_fluid_type(&self, fluid: Option<Fluid>) {
        self.state.lock().fluid = fluid;
    }

    /// Changes the capacity of the tank.
    ///
    /// # Panics
    /// Panics if `capacity` is negative.
    pub fn set_capacity(&self, capacity: f64) {
        assert!(capacity > -AMOUNT_EPSILON, "Tank capacity must not be negative");
        self.state.lock().capacity = capacity.max(0.0);
    }

    /// Whether the tank accepts `fluid` at all.
    #[must_use]
    pub fn is_allowed_fluid(&self, fluid: &Fluid) -> bool {
        self.allowed.as_ref().is_none_or(|allowed| allowed(fluid))
    }

    /// Whether adding `amount` of `fluid` would leave the tank in a valid state.
    #[must_use]
    pub fn can_add_fluid(&self, fluid: &Fluid, amount: f64) -> bool {
        let state = self.state.lock();
        state.fluid.as_ref().is_none_or(|stored| stored == fluid)
            && self.is_allowed_fluid(fluid)
            && state.can_set_fluid(state.amount + amount)
    }

    /// Sets the amount if it is within `0..=capacity`. Returns whether it was set.
    pub fn set_fluid(&self, amount: f64) -> bool {
        self.state.lock().set_fluid(amount)
    }

    /// Adds to the tank if the result fits. Returns whether anything changed.
    pub fn add_fluid(&self, amount: f64) -> bool {
        let mut state = self.state.lock();
        let target = state.amount + amount;
        state.set_fluid(target)
    }

    /// Removes from the tank if enough is stored. Returns whether anything changed.
    pub fn remove_fluid(&self, amount: f64) -> bool {
        let mut state = self.state.lock();
        let target = state.amount - amount;
        state.set_fluid(target)
    }
}

impl FluidBlock for FluidTank {
    fn supplied_fluids(&self) -> anyhow::Result<Vec<(Fluid, f64)>> {
        let state = self.state.lock();
        Ok(state
            .fluid
            .iter()
            .map(|fluid| (fluid.clone(), state.amount))
            .collect())
    }

    fn fluid_amount_requested(&self, fluid: &Fluid) -> anyhow::Result<f64> {
        if !self.is_allowed_fluid(fluid) {
            return Ok(0.0);
        }

        let state = self.state.lock();
        Ok(match &state.fluid {
            None => state.capacity,
            Some(stored) if stored == fluid && state.amount <= state.capacity - AMOUNT_EPSILON => {
                state.capacity - state.amount
            }
            Some(_) => 0.0,
        })
    }

    fn on_fluid_added(&self, fluid: &Fluid, amount: f64) {
        let mut state = self.state.lock();
        if state.fluid.as_ref() != Some(fluid) {
            state.fluid = Some(fluid.clone());
        }
        let target = state.amount + amount;
        state.set_fluid(target);
    }

    fn on_fluid_removed(&self, fluid: &Fluid, amount: f64) {
        let mut state = self.state.lock();
        if state.fluid.as_ref() != Some(fluid) {
            log::warn!("Tank holding {:?} was drained of {fluid}", state.fluid);
            return;
        }
        let target = state.amount - amount;
        state.set_fluid(target);
    }
}
