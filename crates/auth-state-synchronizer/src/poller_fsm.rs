//! Poller state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │     Stopped     │ (initial)
//! └────────┬────────┘
//!          │ Start                    ▲
//!          ▼                          │ Stop
//! ┌─────────────────┐   PollFailed   ┌┴────────────────┐
//! │     Polling     │ ─────────────► │   BackingOff    │ ◄─┐ PollFailed
//! │  (base interval)│ ◄───────────── │ (growing delay) │ ──┘
//! └─────────────────┘  PollSucceeded └─────────────────┘
//!                      Reset
//!                      ErrorBudgetExhausted
//! ```
//!
//! `ErrorBudgetExhausted` fires after too many consecutive failures and
//! restarts polling from the base interval instead of backing off further.

use rust_fsm::*;

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub poller_machine(Stopped)

    Stopped => {
        Start => Polling
    },
    Polling => {
        PollSucceeded => Polling,
        PollFailed => BackingOff,
        Reset => Polling,
        Stop => Stopped
    },
    BackingOff => {
        PollSucceeded => Polling,
        PollFailed => BackingOff,
        ErrorBudgetExhausted => Polling,
        Reset => Polling,
        Stop => Stopped
    }
}

pub use poller_machine::Input as PollerInput;
pub use poller_machine::State as PollerState;
pub use poller_machine::StateMachine as PollerMachine;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_stopped() {
        let machine = PollerMachine::new();
        assert_eq!(*machine.state(), PollerState::Stopped);
    }

    #[test]
    fn test_failures_back_off_and_success_recovers() {
        let mut machine = PollerMachine::new();
        machine.consume(&PollerInput::Start).unwrap();
        machine.consume(&PollerInput::PollFailed).unwrap();
        assert_eq!(*machine.state(), PollerState::BackingOff);
        machine.consume(&PollerInput::PollFailed).unwrap();
        assert_eq!(*machine.state(), PollerState::BackingOff);

        machine.consume(&PollerInput::PollSucceeded).unwrap();
        assert_eq!(*machine.state(), PollerState::Polling);
    }

    #[test]
    fn test_error_budget_restarts_polling() {
        let mut machine = PollerMachine::new();
        machine.consume(&PollerInput::Start).unwrap();
        machine.consume(&PollerInput::PollFailed).unwrap();
        machine.consume(&PollerInput::ErrorBudgetExhausted).unwrap();
        assert_eq!(*machine.state(), PollerState::Polling);
    }

    #[test]
    fn test_cannot_poll_while_stopped() {
        let mut machine = PollerMachine::new();
        assert!(machine.consume(&PollerInput::PollSucceeded).is_err());
        assert!(machine.consume(&PollerInput::Stop).is_err());
        assert_eq!(*machine.state(), PollerState::Stopped);
    }

    #[test]
    fn test_stop_from_backing_off() {
        let mut machine = PollerMachine::new();
        machine.consume(&PollerInput::Start).unwrap();
        machine.consume(&PollerInput::PollFailed).unwrap();
        machine.consume(&PollerInput::Stop).unwrap();
        assert_eq!(*machine.state(), PollerState::Stopped);
    }
}
