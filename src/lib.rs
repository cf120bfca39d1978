//! GSM Layer 2 data-link core: LAPDm (ETSI TS 04.06 / TS 44.006) and its LAPD peer
//! (TS 48.056) — a sliding-window acknowledged data-link protocol.
//!
//! Supports `no_std`; the FSM, history, and queues use `alloc` for their growable owned buffers,
//! since none of them have a useful compile-time bound.
#![no_std]

extern crate alloc;

pub mod config;
pub mod datalink;
pub mod entity;
pub mod error;
pub mod frame;
pub mod history;
pub mod primitives;
pub mod timer;

pub use config::{AddressMode, ChannelKind, DatalinkConfig, LinkContext, LinkMode, VRange};
pub use datalink::{Datalink, State};
pub use entity::Entity;
pub use error::{FrameDecodeError, MdlErrorCause, ReleaseCause};
pub use frame::{Address, ControlWidth, Frame, LapdmFormat, Sapi};
pub use primitives::{Action, DlIndication, DlRequest, Event, ReleaseMode};
pub use timer::TimerKind;
