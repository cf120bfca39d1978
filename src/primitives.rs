//! Service Primitives (spec.md §6): the DL-SAP surface between L3 and the core, plus the typed
//! `Event`/`Action` pair that makes the FSM testable without any real I/O, per the design note in
//! spec.md §9 ("structure the core as a pure step function").

use crate::config::ChannelKind;
use crate::error::{MdlErrorCause, ReleaseCause};
use crate::timer::TimerKind;
use alloc::vec::Vec;

/// Release mode carried on a DL-REL.req (spec.md §6).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Exchange DISC/UA with the peer before tearing down.
    Normal,
    /// Drop to IDLE immediately, regardless of in-flight frames.
    Local,
}

/// A request from L3 down into a [`crate::datalink::Datalink`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub enum DlRequest {
    /// DL-EST.req: establish the link, optionally carrying a contention-resolution payload.
    Establish { payload: Option<Vec<u8>> },
    /// DL-DATA.req: send an acknowledged L3 message.
    Data { payload: Vec<u8> },
    /// DL-UNIT-DATA.req: send a connectionless (UI) L3 message.
    UnitData { payload: Vec<u8> },
    /// DL-REL.req.
    Release { mode: ReleaseMode },
    /// DL-SUSP.req: suspend, preserving queued/in-flight state.
    Suspend,
    /// DL-RES.req: resume, optionally replacing the current send-buffer.
    Resume { payload: Option<Vec<u8>> },
    /// DL-RECON.req: reconnect from any non-NULL state; same payload semantics as `Resume`.
    Reconnect { payload: Option<Vec<u8>> },
}

/// An indication/confirmation delivered up to L3, or an MDL-ERROR.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub enum DlIndication {
    EstablishIndication { payload: Option<Vec<u8>> },
    EstablishConfirm,
    DataIndication { payload: Vec<u8> },
    UnitDataIndication { payload: Vec<u8> },
    ReleaseIndication { cause: ReleaseCause },
    ReleaseConfirm { cause: ReleaseCause },
    SuspendConfirm,
    MdlError { cause: MdlErrorCause },
}

/// Everything that can drive a step of the core: a DL-SAP request from L3, a received PHY frame,
/// or a timer firing. `step`-style entry points take one `Event` and return a batch of `Action`s.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub enum Event {
    Request(DlRequest),
    FrameReceived { bytes: Vec<u8> },
    TimerExpired(TimerKind),
    /// Establishes N201/format/channel parameters for the datalink; issued once up front by the
    /// owning Entity, not part of the steady-state DL-SAP surface.
    Configure { channel: ChannelKind },
}

/// Everything a step of the core can ask the host to do: (re)program a timer, or surface a
/// primitive to L3. Outgoing frames are never an `Action`: [`crate::datalink::Datalink`] appends
/// them to its own tx-queue, and it is [`crate::entity::Entity`]'s job to drain tx-queues onto the
/// single PHY write slot (spec.md §4.5) — see [`crate::entity::Entity::poll_tx`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone)]
pub enum Action {
    StartTimer { kind: TimerKind },
    StopTimer { kind: TimerKind },
    /// Surface `indication` to L3.
    Indicate(DlIndication),
}
