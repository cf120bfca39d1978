//! Per-datalink configuration (spec.md §6).

use crate::frame::{ControlWidth, LapdmFormat};
use crate::timer::from_sec_usec;
use embedded_time::duration::Milliseconds;

/// Sequence-number modulus. LAPDm normally runs modulo 8; LAPD (and LAPDm extended) modulo 128.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VRange {
    Mod8,
    Mod128,
}

impl VRange {
    pub const fn value(self) -> u8 {
        match self {
            VRange::Mod8 => 8,
            VRange::Mod128 => 128,
        }
    }
}

/// Which side of the link this datalink instance plays, determining the C/R bit convention for
/// commands vs. responses (spec.md §3).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    User,
    Network,
}

impl LinkMode {
    /// C/R bit value this side uses when sending a command (TS 04.06 §3.2): the mobile station
    /// side always sends commands with C/R=0, the network side with C/R=1.
    pub const fn own_command_cr_bit(self) -> bool {
        match self {
            LinkMode::User => false,
            LinkMode::Network => true,
        }
    }

    /// C/R bit value that marks an *incoming* frame from the peer as a command: the complement
    /// of [`LinkMode::own_command_cr_bit`], since the two ends of a link are never the same mode.
    pub const fn peer_command_cr_bit(self) -> bool {
        !self.own_command_cr_bit()
    }
}

/// Which address form this datalink emits and expects (spec.md §3/§4.1): LAPDm's single octet
/// (the normal Um-interface case), or LAPD's two-octet extended-TEI form (TS 48.056), used when
/// this engine plays the peer LAPD role rather than LAPDm.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    Lapdm,
    Lapd { tei: u8 },
}

/// Logical channel kind, used to derive `n201` (max payload octets) at establishment time
/// instead of hard-coding it, per the Open Question resolution in spec.md §9.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Stand-alone dedicated control channel: format B, N201 = 20.
    Sdcch,
    /// Slow associated control channel: format B4 with a 2-octet L1 header, N201 = 18.
    Sacch,
    /// Fast associated control channel / traffic channel signaling: format B, N201 = 20.
    Facch,
    /// Broadcast/common control channel downlink: format Bbis, transparent, N201 = 23.
    Bcch,
}

impl ChannelKind {
    pub const fn n201(self) -> u8 {
        match self {
            ChannelKind::Sdcch => 20,
            ChannelKind::Sacch => 18,
            ChannelKind::Facch => 20,
            ChannelKind::Bcch => 23,
        }
    }

    const fn format(self) -> LapdmFormat {
        match self {
            ChannelKind::Sdcch | ChannelKind::Facch => LapdmFormat::B,
            ChannelKind::Sacch => LapdmFormat::B4,
            ChannelKind::Bcch => LapdmFormat::Bbis,
        }
    }
}

/// Wire parameters derived once at `DL-CONFIG` time from a [`ChannelKind`] and [`VRange`]: which
/// on-air format to use, how wide the control octet is, and N201. Held by the
/// [`crate::datalink::Datalink`] once configured; absent before then.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct LinkContext {
    pub channel: ChannelKind,
    pub format: LapdmFormat,
    pub width: ControlWidth,
    pub n201: u8,
    pub address_mode: AddressMode,
}

impl LinkContext {
    pub fn new(channel: ChannelKind, v_range: VRange, address_mode: AddressMode) -> Self {
        LinkContext {
            channel,
            format: channel.format(),
            width: match v_range {
                VRange::Mod8 => ControlWidth::Basic,
                VRange::Mod128 => ControlWidth::Extended,
            },
            n201: channel.n201(),
            address_mode,
        }
    }
}

/// Configuration for one [`crate::datalink::Datalink`], set at init per spec.md §6.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct DatalinkConfig {
    /// Window size, 1..=v_range-1. Typically 1 for SAPI 0.
    pub k: u8,
    pub v_range: VRange,
    /// Maximum reassembled L3 message size.
    pub maxf: usize,
    /// Retransmit limit in MF_EST/TIMER_RECOV.
    pub n200: u8,
    /// Retransmit limit during establishment/release.
    pub n200_est_rel: u8,
    pub t200: Milliseconds<u64>,
    /// `None` disables T203 entirely.
    pub t203: Option<Milliseconds<u64>>,
    pub mode: LinkMode,
    /// Use SABME instead of SABM (required when `v_range` is `Mod128`).
    pub use_sabme: bool,
    /// Auto-reestablish on N200 expiry while in MF_EST/TIMER_RECOV.
    pub reestablish: bool,
    /// Which address form to emit/expect (spec.md §3/§4.1). Defaults to `Lapdm`.
    pub address_mode: AddressMode,
}

impl DatalinkConfig {
    /// Builds a config for `mode`, with all other fields at the recommended defaults
    /// (TS 04.06 §5.6), and `k` clamped to `v_range - 1` exactly as `lapd_dl_init` does.
    pub fn new(mode: LinkMode) -> Self {
        let mut cfg = Self {
            k: 1,
            v_range: VRange::Mod8,
            maxf: 512,
            n200: 3,
            n200_est_rel: 3,
            t200: from_sec_usec(1, 0),
            t203: Some(from_sec_usec(10, 0)),
            mode,
            use_sabme: false,
            reestablish: true,
            address_mode: AddressMode::Lapdm,
        };
        cfg.clamp_k();
        cfg
    }

    /// Smallest power of two >= k+1, matching `lapd_dl_init`'s `range_hist` derivation.
    pub const fn range_hist(&self) -> usize {
        let need = self.k as usize + 1;
        let mut m = 1usize;
        while m < need {
            m <<= 1;
        }
        m
    }

    fn clamp_k(&mut self) {
        let max_k = self.v_range.value() - 1;
        if self.k > max_k {
            self.k = max_k;
        }
        if self.k == 0 {
            self.k = 1;
        }
    }
}

impl Default for DatalinkConfig {
    fn default() -> Self {
        Self::new(LinkMode::User)
    }
}
