//! Escalation — Deterministic State Machine for incident assistance
//!
//! Routes the user down a fixed ladder of increasingly manual paths. Pure
//! state machine: no timers, no network. Every component outcome arrives as
//! an event and every side effect leaves as an `Action`.
//!
//! # Escalation Ladder
//!
//! ```text
//! initial ──start──▶ listening
//!     │
//!     ├─ "sí" (activated) ──────▶ processing ──valid──▶ chat ──resolved──▶ completed
//!     ├─ "no" / no speech ──────▶ processing          │
//!     │                              │ invalid/error   │ 60s idle / error
//!     │                              ▼                 ▼
//!     │                        checking_coverage (coverage probe → SIM probe)
//!     │                              │ sim ok          │ fail / error
//!     │                              ▼                 ▼
//!     │                        emergency_call ──fail──▶ emergency_form ──submitted──▶ completed
//!     │                              │ initiated + settle delay
//!     │                              ▼
//!     │                          completed ──reset──▶ initial
//! ```
//!
//! Failure edges only point down. Without `reset` the graph is acyclic and
//! every state reaches `completed` in at most four hops.

pub mod engine;
pub mod machine;
pub mod state;

pub use engine::{
    accepted_events, entry_actions, exit_actions, notice_for, react, shortest_path_to_completed,
    successors, transition, Action, Reaction,
};
pub use machine::{EscalationStateMachine, Outcome, TransitionRecord};
pub use state::{AppState, EscalationEvent, ProcessingContext, ProcessingPath};
