//! Error and indication types surfaced by the core.
//!
//! The core never panics on malformed peer input (spec.md §7): every fault either produces one
//! of these typed values or is silently absorbed per the relevant invariant.

use core::fmt;

/// Failure decoding a raw byte slice into a [`crate::frame::Frame`], at a point before any
/// `MdlErrorCause` can be assigned (the bytes don't even reach the address/control octets).
///
/// Mirrors the teacher's `PhyPayloadDecodeError::SmallerThanMinSize { have, need }` shape:
/// struct-like variants carrying the observed/required sizes rather than a formatted string.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecodeError {
    /// Fewer bytes were supplied than the minimum for any recognized LAPDm/LAPD format.
    TooShort { have: usize, need: usize },
    /// The length-indicator octet's EL bit was 0 (reserved/unimplemented encoding).
    BadLengthIndicator,
    /// The control octet matched no known U/S/I pattern.
    UnknownControl { octet: u8 },
    /// `length` exceeded the datalink's configured N201.
    LengthExceedsN201 { length: usize, n201: usize },
    /// A LAPD (two-octet address) frame's second address octet had its `EA` bit clear, which
    /// would require a third address octet this engine doesn't support.
    BadAddressExtension,
}

impl fmt::Display for FrameDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameDecodeError::TooShort { have, need } => {
                write!(f, "frame too short: have {have}, need at least {need}")
            }
            FrameDecodeError::BadLengthIndicator => {
                write!(f, "length indicator EL bit was 0")
            }
            FrameDecodeError::UnknownControl { octet } => {
                write!(f, "unrecognized control octet 0x{octet:02x}")
            }
            FrameDecodeError::LengthExceedsN201 { length, n201 } => {
                write!(f, "length {length} exceeds N201 ({n201})")
            }
            FrameDecodeError::BadAddressExtension => {
                write!(f, "LAPD address extension octet's EA bit was 0")
            }
        }
    }
}

/// MDL-ERROR cause taxonomy (spec.md §7). Surfaced upward via `Action::MdlError`; never fatal to
/// the datalink by itself — the FSM always stays in, or deterministically leaves, a valid state.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdlErrorCause {
    /// Frame with reserved/unimplemented encoding, or wrong C/R for its form.
    FrmUnimpl,
    /// U-frame with L>0, M=1, or length>N201.
    UFrmIncParam,
    /// S-frame with L>0 or M=1.
    SFrmIncParam,
    /// I-frame with L=0 or L>N201.
    IFrmIncLen,
    /// I-frame with L<N201 and M=1.
    IFrmIncMbits,
    /// DM response in MF_EST with F=1.
    UnsolDmResp,
    /// DM response in MF_EST or TIMER_RECOV with F=0.
    UnsolDmRespMf,
    /// UA response in a non-establishing state.
    UnsolUaResp,
    /// Supervisory response with F=1 outside TIMER_RECOV.
    UnsolSprvResp,
    /// N(R) fell outside `(V(A), V(S)]`.
    SeqErr,
    /// SABM received while already in MF_EST: peer lost synchronization.
    SabmMf,
    /// SABM carried a payload while contention resolution was already in progress.
    SabmInfoNotall,
    /// N200 retransmissions exhausted.
    T200Expired,
    /// FRMR U-frame received from the peer.
    Frmr,
}

impl fmt::Display for MdlErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Cause code carried on a DL-REL indication/confirm, when one is available.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseCause {
    /// The peer issued a normal DISC/UA exchange.
    Normal,
    /// T200 was exhausted during establishment or release.
    Timeout,
    /// The local side requested an immediate local release, bypassing any exchange.
    Local,
}
