//! View-facing pub/sub
//!
//! Consumers subscribe instead of reading shared state.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│    Views     │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, FilteredReceiver, NoticeFilter, SharedEventBus};
pub use types::{Notice, NoticeLevel, SessionNotice};
