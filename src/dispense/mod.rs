//! Function-pointer finite state machine driving the dispense cycle.
//!
//! Classic embedded FSM pattern expressed in safe Rust:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  StateTable                                             │
//! │  ┌──────────┬───────────┬──────────┬──────────────────┐ │
//! │  │ StateId  │ on_enter  │ on_exit  │ on_update        │ │
//! │  ├──────────┼───────────┼──────────┼──────────────────┤ │
//! │  │ Idle     │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option  │ │
//! │  │ PreRoll  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option  │ │
//! │  │ Actuating│ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option  │ │
//! │  │ Settling │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option  │ │
//! │  └──────────┴───────────┴──────────┴──────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut DispenseContext`
//! which holds ISR signal handles, actuator commands, timing, and the
//! fault latch.
//!
//! Timing is millisecond-driven rather than tick-counted: the caller
//! passes the wall-clock milliseconds elapsed since the previous tick,
//! so the same machine runs correctly under a 1 ms control loop on
//! hardware and coarse 100 ms steps in host tests.

pub mod context;
pub mod states;

use context::DispenseContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all dispense cycle states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    PreRoll = 1,
    Actuating = 2,
    Settling = 3,
}

impl StateId {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 4;

    /// Convert a `u8` index back to `StateId`.  Panics on out-of-range
    /// in debug builds; returns `Idle` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::PreRoll,
            2 => Self::Actuating,
            3 => Self::Settling,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Idle
            }
        }
    }

    /// True for every state in which a dispense session is in flight.
    pub fn is_dispensing(self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PreRoll => "PreRoll",
            Self::Actuating => "Actuating",
            Self::Settling => "Settling",
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut DispenseContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut DispenseContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array — no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]) and advances a
/// caller-supplied [`DispenseContext`] on every tick.
pub struct DispenseFsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
}

impl DispenseFsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut DispenseContext) {
        info!("dispense FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick of `elapsed_ms` wall-clock time.
    ///
    /// 1. Accumulate elapsed time into the context.
    /// 2. Call `on_update` for the current state.
    /// 3. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut DispenseContext, elapsed_ms: u32) {
        ctx.tick_elapsed_ms = elapsed_ms;
        ctx.ms_in_state = ctx.ms_in_state.saturating_add(elapsed_ms);
        ctx.session_elapsed_ms = ctx.session_elapsed_ms.saturating_add(elapsed_ms);

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut DispenseContext) {
        let next_idx = next_id as usize;

        info!(
            "dispense transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        // Exit current state
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer and timing
        self.current = next_idx;
        ctx.ms_in_state = 0;

        // Enter new state
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispenserConfig;
    use crate::sensors::photogate::PhotogateSignals;

    fn make_ctx() -> DispenseContext {
        let signals: &'static PhotogateSignals = Box::leak(Box::new(PhotogateSignals::new()));
        DispenseContext::new(DispenserConfig::default(), signals)
    }

    fn make_fsm() -> DispenseFsm {
        DispenseFsm::new(states::build_state_table(), StateId::Idle)
    }

    #[test]
    fn starts_in_idle() {
        let fsm = make_fsm();
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(!fsm.current_state().is_dispensing());
    }

    #[test]
    fn idle_without_trigger_stays_idle() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        for _ in 0..100 {
            fsm.tick(&mut ctx, 1);
        }
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(!ctx.commands.motor_run);
    }

    #[test]
    fn ms_in_state_resets_on_transition() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        fsm.tick(&mut ctx, 50);
        ctx.request_dispense();
        fsm.tick(&mut ctx, 50);
        assert_eq!(fsm.current_state(), StateId::PreRoll);
        assert_eq!(ctx.ms_in_state, 0);
    }
}
