//! Vigia: browser-resident telemetry and remote-control engine.
//!
//! Lets an external operator observe and drive an unmodified web page
//! over a persistent socket. Noisy raw input (clicks, keystrokes,
//! scrolls, hovers, DOM mutations) is classified and debounced into a
//! compact semantic event stream, and realistic interactions (typing
//! with humanlike cadence and typos, clicks, key combinations) can be
//! synthesized on demand.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      VIGIA Architecture                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────────┐   ┌───────────────────┐    │
//! │  │ Operator │──►│ Connection &  │──►│ Channel handlers  │    │
//! │  │ (socket) │◄──│ Router        │◄──│ (12 channels)     │    │
//! │  └──────────┘   └───────────────┘   └─────────┬─────────┘    │
//! │                                               │              │
//! │      ┌───────────────┬────────────────┬───────┴────────┐     │
//! │      ▼               ▼                ▼                ▼     │
//! │  ┌─────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐  │
//! │  │ Semantic│   │ Mutation  │   │ Simulator │   │ Console/ │  │
//! │  │ engine  │   │ watch     │   │           │   │ Recorder │  │
//! │  └────┬────┘   └─────┬─────┘   └─────┬─────┘   └────┬─────┘  │
//! │       └──────────────┴───────┬───────┴──────────────┘        │
//! │                              ▼                               │
//! │                   ┌─────────────────────┐                    │
//! │                   │ PageAdapter (trait) │                    │
//! │                   └─────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All platform access goes through [`page::PageAdapter`], so every
//! classifier, filter, and dispatcher is unit-testable against the
//! in-memory [`page::fake::FakePage`] with a [`clock::FakeClock`].

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

pub mod clock;
pub mod connection;
pub mod console;
pub mod debounce;
pub mod descriptor;
pub mod mutation;
pub mod page;
pub mod protocol;
pub mod recording;
pub mod result;
pub mod router;
pub mod selection;
pub mod semantic;
pub mod simulate;

pub use clock::{ClockHandle, EngineClock, FakeClock, SystemClock};
pub use connection::{Connection, ConnectionState, SocketTransport, TransportHandle};
pub use console::{ConsoleBuffer, ConsoleEntry, ConsoleLevel};
pub use debounce::Debouncer;
pub use descriptor::{DescriptorSource, TargetDescriptor};
pub use mutation::{
    FilterPreset, FilterRules, MutationBatch, MutationConfig, MutationEngine, MutationRecord,
    NotableChange,
};
pub use page::{
    ElementInfo, NodeId, PageAdapter, PageHandle, RawEvent, RawEventKind, Rect, SyntheticEvent,
};
pub use protocol::{Channel, Message, Response};
pub use recording::{RecordedStep, Recorder, Recording};
pub use result::{VigiaError, VigiaResult};
pub use router::Router;
pub use selection::{SelectionPhase, SelectionResult, SelectionSession};
pub use semantic::{
    EventCategory, SemanticEngine, SemanticEvent, Subscription, SubscriptionPreset,
};
pub use simulate::{FocusMode, Simulator, TypeOptions};
