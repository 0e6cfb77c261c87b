//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers — no closures, no
//! dynamic dispatch, no heap.  This is the classic embedded C FSM
//! pattern expressed in safe Rust.
//!
//! ```text
//!  IDLE ──[trigger && !OutOfTreats]──▶ PREROLL
//!    ▲                                    │
//!    │                          [emitters settled]
//!    │                                    ▼
//!    │                                ACTUATING
//!    │                                    │
//!    │               [treat at chute]  or  [hard timeout → OutOfTreats]
//!    │                                    ▼
//!    └───────[guard re-armed + settle]─ SETTLING
//! ```
//!
//! The starve accumulator that backs the `HopperEmpty` fault lives in
//! the shared [`PhotogateSignals`] and deliberately survives session
//! boundaries: a hopper running dry over several short sessions trips
//! the fault just as surely as one long dry spin.
//!
//! [`PhotogateSignals`]: crate::sensors::photogate::PhotogateSignals

use super::context::DispenseContext;
use super::{StateDescriptor, StateId};
use crate::error::DeviceFault;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — PreRoll
        StateDescriptor {
            id: StateId::PreRoll,
            name: "PreRoll",
            on_enter: Some(preroll_enter),
            on_exit: None,
            on_update: preroll_update,
        },
        // Index 2 — Actuating
        StateDescriptor {
            id: StateId::Actuating,
            name: "Actuating",
            on_enter: Some(actuating_enter),
            on_exit: Some(actuating_exit),
            on_update: actuating_update,
        },
        // Index 3 — Settling
        StateDescriptor {
            id: StateId::Settling,
            name: "Settling",
            on_enter: Some(settling_enter),
            on_exit: Some(settling_exit),
            on_update: settling_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut DispenseContext) {
    // Motor neutral, emitters dark.  The ISR guard stays armed so stray
    // photo-interrupter edges between sessions are ignored.
    ctx.commands.motor_run = false;
    ctx.commands.sensor_leds_on = false;
}

fn idle_update(ctx: &mut DispenseContext) -> Option<StateId> {
    if !ctx.trigger_pending() {
        return None;
    }
    // Consume the trigger even when suppressed: a request made while the
    // machine is out of treats must not fire spontaneously after refill.
    ctx.take_trigger();
    if ctx.faults.dispense_suppressed() {
        warn!("dispense request dropped: out-of-treats latched");
        return None;
    }
    Some(StateId::PreRoll)
}

// ═══════════════════════════════════════════════════════════════════════════
//  PREROLL state — emitters warming, beams not yet trusted
// ═══════════════════════════════════════════════════════════════════════════

fn preroll_enter(ctx: &mut DispenseContext) {
    ctx.commands.sensor_leds_on = true;
}

fn preroll_update(ctx: &mut DispenseContext) -> Option<StateId> {
    if ctx.ms_in_state >= ctx.config.settle_ms {
        return Some(StateId::Actuating);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACTUATING state — motor turning, ISRs live
// ═══════════════════════════════════════════════════════════════════════════

fn actuating_enter(ctx: &mut DispenseContext) {
    ctx.session_elapsed_ms = 0;
    ctx.session_timed_out = false;
    // Drop the guard and arm the completion flag *before* the motor
    // moves, then start turning.  Note the starve accumulator is not
    // reset here — it carries across sessions until a hopper treat is
    // actually seen.
    ctx.signals.set_guard(false);
    ctx.signals.set_dispensing(true);
    ctx.commands.motor_run = true;
    info!("dispense session started");
}

fn actuating_update(ctx: &mut DispenseContext) -> Option<StateId> {
    // Hopper beam broken since last tick: treats are flowing, so the
    // starve clock restarted in the ISR and any HopperEmpty latch is
    // stale.
    if ctx.signals.take_hopper_seen() {
        ctx.faults.clear(DeviceFault::HopperEmpty);
    }

    let starve_ms = ctx.signals.add_starve_ms(ctx.tick_elapsed_ms);
    if starve_ms >= ctx.config.hopper_empty_ms {
        ctx.faults.latch(DeviceFault::HopperEmpty);
    }

    // Treat confirmed at the chute — session done.
    if !ctx.signals.dispensing() {
        return Some(StateId::Settling);
    }

    // Hard timeout: the wheel has turned far too long without a treat
    // reaching the chute.  Latch OutOfTreats and abort the session.
    if ctx.session_elapsed_ms >= ctx.config.dispense_timeout_ms {
        warn!(
            "dispense timed out after {} ms without a treat at the chute",
            ctx.session_elapsed_ms
        );
        ctx.faults.latch(DeviceFault::OutOfTreats);
        ctx.signals.set_dispensing(false);
        ctx.session_timed_out = true;
        return Some(StateId::Settling);
    }

    None
}

fn actuating_exit(ctx: &mut DispenseContext) {
    // Motor stops first, unconditionally — before any other teardown.
    ctx.commands.motor_run = false;
}

// ═══════════════════════════════════════════════════════════════════════════
//  SETTLING state — wheel coasting to rest
// ═══════════════════════════════════════════════════════════════════════════

fn settling_enter(ctx: &mut DispenseContext) {
    // Re-arm the guard so edges from the coasting wheel are ignored.
    ctx.signals.set_guard(true);
}

fn settling_update(ctx: &mut DispenseContext) -> Option<StateId> {
    if ctx.ms_in_state >= ctx.config.settle_ms {
        return Some(StateId::Idle);
    }
    None
}

fn settling_exit(ctx: &mut DispenseContext) {
    ctx.commands.sensor_leds_on = false;
    if ctx.session_timed_out {
        info!("dispense session aborted (timeout), no treat credited");
    } else {
        ctx.sessions_completed = ctx.sessions_completed.wrapping_add(1);
        info!("dispense session complete ({} total)", ctx.sessions_completed);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispenserConfig;
    use crate::dispense::DispenseFsm;
    use crate::sensors::photogate::PhotogateSignals;

    fn make_parts() -> (DispenseFsm, DispenseContext) {
        let signals: &'static PhotogateSignals = Box::leak(Box::new(PhotogateSignals::new()));
        let mut fsm = DispenseFsm::new(build_state_table(), StateId::Idle);
        let mut ctx = DispenseContext::new(DispenserConfig::default(), signals);
        fsm.start(&mut ctx);
        (fsm, ctx)
    }

    /// Step the machine in `step_ms` increments for `total_ms`.
    fn run_for(fsm: &mut DispenseFsm, ctx: &mut DispenseContext, total_ms: u32, step_ms: u32) {
        let mut t = 0;
        while t < total_ms {
            fsm.tick(ctx, step_ms);
            t += step_ms;
        }
    }

    #[test]
    fn trigger_walks_through_preroll_into_actuating() {
        let (mut fsm, mut ctx) = make_parts();
        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        assert_eq!(fsm.current_state(), StateId::PreRoll);
        assert!(ctx.commands.sensor_leds_on);
        assert!(!ctx.commands.motor_run);

        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(fsm.current_state(), StateId::Actuating);
        assert!(ctx.commands.motor_run);
        assert!(!ctx.signals.guard());
        assert!(ctx.signals.dispensing());
    }

    #[test]
    fn chute_edge_completes_session_and_credits_treat() {
        let (mut fsm, mut ctx) = make_parts();
        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(fsm.current_state(), StateId::Actuating);

        run_for(&mut fsm, &mut ctx, 500, 10);
        ctx.signals.dispense_edge();
        fsm.tick(&mut ctx, 10);
        assert_eq!(fsm.current_state(), StateId::Settling);
        assert!(!ctx.commands.motor_run);
        assert!(ctx.signals.guard());

        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(!ctx.commands.sensor_leds_on);
        assert_eq!(ctx.sessions_completed, 1);
        assert!(!ctx.faults.any());
    }

    #[test]
    fn hard_timeout_latches_out_of_treats_without_credit() {
        let (mut fsm, mut ctx) = make_parts();
        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(fsm.current_state(), StateId::Actuating);

        // No treat ever reaches the chute.
        run_for(&mut fsm, &mut ctx, 30_000, 100);
        assert_eq!(fsm.current_state(), StateId::Settling);
        assert!(!ctx.commands.motor_run);
        assert!(ctx.faults.has(DeviceFault::OutOfTreats));
        assert!(ctx.session_timed_out);

        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(ctx.sessions_completed, 0);
    }

    #[test]
    fn out_of_treats_suppresses_new_sessions_until_cleared() {
        let (mut fsm, mut ctx) = make_parts();
        ctx.faults.latch(DeviceFault::OutOfTreats);

        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        assert_eq!(fsm.current_state(), StateId::Idle);
        // The suppressed request is consumed, not deferred.
        assert!(!ctx.trigger_pending());

        ctx.faults.clear_all();
        fsm.tick(&mut ctx, 1);
        assert_eq!(fsm.current_state(), StateId::Idle);

        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        assert_eq!(fsm.current_state(), StateId::PreRoll);
    }

    #[test]
    fn starve_accumulator_carries_across_sessions() {
        let (mut fsm, mut ctx) = make_parts();

        // Session one: 4000 ms dry, then a treat at the chute ends it.
        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        run_for(&mut fsm, &mut ctx, 200, 10);
        run_for(&mut fsm, &mut ctx, 4_000, 100);
        assert!(!ctx.faults.has(DeviceFault::HopperEmpty));
        ctx.signals.dispense_edge();
        fsm.tick(&mut ctx, 10);
        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(fsm.current_state(), StateId::Idle);

        // Session two: 1500 ms more tips the 5000 ms accumulator.
        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        run_for(&mut fsm, &mut ctx, 200, 10);
        run_for(&mut fsm, &mut ctx, 1_500, 100);
        assert!(ctx.faults.has(DeviceFault::HopperEmpty));

        // HopperEmpty is informational: the session keeps running and
        // still completes normally.
        ctx.signals.dispense_edge();
        fsm.tick(&mut ctx, 10);
        run_for(&mut fsm, &mut ctx, 200, 10);
        assert_eq!(ctx.sessions_completed, 2);
    }

    #[test]
    fn hopper_edge_resets_starve_and_clears_fault() {
        let (mut fsm, mut ctx) = make_parts();
        ctx.request_dispense();
        fsm.tick(&mut ctx, 1);
        run_for(&mut fsm, &mut ctx, 200, 10);

        run_for(&mut fsm, &mut ctx, 5_000, 100);
        assert!(ctx.faults.has(DeviceFault::HopperEmpty));

        // Treats start flowing again from the hopper.
        ctx.signals.hopper_edge();
        fsm.tick(&mut ctx, 10);
        assert!(!ctx.faults.has(DeviceFault::HopperEmpty));
        assert!(ctx.signals.starve_ms() < 100);
    }
}
