//! Frame Codec (spec.md §4.1): encode/decode of LAPDm A/B/Bbis/Bter/B4 formats and LAPD U/S/I
//! control octets, enforcing the length-indicator (LI) and EA/M bit invariants.
//!
//! Per the design note in spec.md §9, the decoded frame is a tagged union rather than the
//! teacher's flat bitfield-struct-with-discriminant-fields style, so the FSM can match
//! exhaustively instead of threading a family of "format not handled" branches through every
//! caller.
//!
//! Also covers the link-layer address itself (spec.md §3/§4.1): LAPDm's single octet, or LAPD's
//! two-octet extended-TEI form (TS 48.056), via [`Address`].

use crate::error::FrameDecodeError;
use alloc::vec::Vec;
use modular_bitfield::prelude::*;

/// Link protocol discriminator (bit 7-6 of the address octet). LAPDm always uses `GsmRadio`; the
/// LAPD peer variant (see [`Address::Lapd`]) carries the same value here and distinguishes itself
/// by clearing the first octet's `EA` bit instead.
pub const LPD_GSM_RADIO: u8 = 0;

/// Service Access Point Identifier (spec.md GLOSSARY). LAPDm defines two: the "normal" SAPI used
/// for call-control/mobility-management signaling, and the "SMS" SAPI used for point-to-point
/// short message service.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, BitfieldSpecifier)]
#[bits = 3]
pub enum Sapi {
    Normal = 0,
    Sms = 3,
}

impl Sapi {
    /// The SAPIs an [`crate::entity::Entity`] owns, in Datalink-array order.
    pub const ALL: [Sapi; 2] = [Sapi::Normal, Sapi::Sms];

    pub fn index(self) -> usize {
        match self {
            Sapi::Normal => 0,
            Sapi::Sms => 1,
        }
    }

    pub fn from_raw(v: u8) -> Option<Sapi> {
        match v {
            0 => Some(Sapi::Normal),
            3 => Some(Sapi::Sms),
            _ => None,
        }
    }
}

/// Command vs. response, carried as the C/R bit. Which concrete bit value means "command"
/// depends on [`crate::config::LinkMode`] (spec.md §3): a user-side datalink sends commands with
/// C/R=0 and a network-side datalink sends commands with C/R=1 (TS 04.06 §3.2), so this type is
/// deliberately abstract rather than a raw bit.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cr {
    Command,
    Response,
}

/// First octet of the address field, shared by both LAPDm and LAPD: `LPD(2) | SAPI(3) | C/R(1) |
/// EA(1)`. For LAPDm this is the entire address (`ea`=1); for LAPD (see [`Address::Lapd`]) `ea`=0
/// here and a second [`TeiOctet`] follows.
#[bitfield]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressOctet {
    /// Extension bit: 1 if this is the only address octet, 0 if a [`TeiOctet`] follows.
    pub ea: bool,
    /// Raw command/response bit; map to [`Cr`] using [`crate::config::LinkMode`].
    pub cr_bit: bool,
    #[bits = 3]
    pub sapi: Sapi,
    pub lpd: B2,
    /// Reserved, always 0.
    pub spare: bool,
}

/// Second octet of LAPD's two-octet address (TS 48.056): `TEI(7) | EA(1)`. Always the last
/// address octet, so `ea` must be 1; a peer sending `ea`=0 here would require a third octet this
/// engine doesn't support, and is rejected with [`crate::error::FrameDecodeError::BadAddressExtension`].
#[bitfield]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeiOctet {
    pub ea: bool,
    pub tei: B7,
}

/// A decoded link-layer address (spec.md §3/§4.1): LAPDm's single-octet form, or LAPD's two-octet
/// form carrying an extended Terminal Endpoint Identifier (TS 48.056).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
    Lapdm(AddressOctet),
    Lapd { octet: AddressOctet, tei: u8 },
}

impl Address {
    pub fn sapi(&self) -> Sapi {
        match self {
            Address::Lapdm(octet) | Address::Lapd { octet, .. } => octet.sapi(),
        }
    }

    pub fn cr_bit(&self) -> bool {
        match self {
            Address::Lapdm(octet) | Address::Lapd { octet, .. } => octet.cr_bit(),
        }
    }
}

/// Length-indicator octet (formats B, B4): `length(6) | M(1) | EL(1)`.
#[bitfield]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy)]
pub struct LengthIndicator {
    /// Extension bit. EL=0 is invalid ([`FrameDecodeError::BadLengthIndicator`]).
    pub el: bool,
    /// More-data bit: set when the segmented L3 message continues in the next frame.
    pub m: bool,
    pub length: B6,
}

/// Supervisory frame subtype.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SKind {
    Rr,
    Rnr,
    Rej,
}

/// Unnumbered frame subtype.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UKind {
    Sabm,
    Sabme,
    Dm,
    Ui,
    Disc,
    Ua,
    Frmr,
}

/// A fully decoded LAPDm/LAPD frame, independent of which on-air format it arrived in.
///
/// The payload is borrowed from the buffer passed to [`decode`]; callers that need to retain it
/// past the buffer's lifetime (e.g. to store a copy in tx-history) must copy it into an owned
/// buffer themselves.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    I {
        nr: u8,
        ns: u8,
        p: bool,
        m: bool,
        payload: &'a [u8],
    },
    S {
        kind: SKind,
        nr: u8,
        pf: bool,
    },
    U {
        kind: UKind,
        pf: bool,
        payload: &'a [u8],
    },
}

const U_SABM: u8 = 0x7;
const U_SABME: u8 = 0xF;
const U_DM: u8 = 0x3;
const U_UI: u8 = 0x0;
const U_DISC: u8 = 0x8;
const U_UA: u8 = 0xC;
const U_FRMR: u8 = 0x11;

fn u_code(kind: UKind) -> u8 {
    match kind {
        UKind::Sabm => U_SABM,
        UKind::Sabme => U_SABME,
        UKind::Dm => U_DM,
        UKind::Ui => U_UI,
        UKind::Disc => U_DISC,
        UKind::Ua => U_UA,
        UKind::Frmr => U_FRMR,
    }
}

fn u_kind_from_code(code: u8) -> Option<UKind> {
    Some(match code {
        U_SABM => UKind::Sabm,
        U_SABME => UKind::Sabme,
        U_DM => UKind::Dm,
        U_UI => UKind::Ui,
        U_DISC => UKind::Disc,
        U_UA => UKind::Ua,
        U_FRMR => UKind::Frmr,
        _ => return None,
    })
}

fn s_code(kind: SKind) -> u8 {
    match kind {
        SKind::Rr => 0b00,
        SKind::Rnr => 0b01,
        SKind::Rej => 0b10,
    }
}

fn s_kind_from_code(code: u8) -> Option<SKind> {
    Some(match code {
        0b00 => SKind::Rr,
        0b01 => SKind::Rnr,
        0b10 => SKind::Rej,
        _ => return None,
    })
}

/// Control-octet width: basic (1 octet, modulo-8) or extended (2 octets, modulo-128).
///
/// Mirrors `v_range`: [`crate::config::VRange::Mod8`] uses [`ControlWidth::Basic`],
/// [`crate::config::VRange::Mod128`] uses [`ControlWidth::Extended`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWidth {
    Basic,
    Extended,
}

fn encode_control_i(ns: u8, nr: u8, p: bool, width: ControlWidth, out: &mut Vec<u8>) {
    match width {
        ControlWidth::Basic => {
            let byte = ((nr & 0x7) << 5) | ((p as u8) << 4) | ((ns & 0x7) << 1);
            out.push(byte);
        }
        ControlWidth::Extended => {
            out.push((ns & 0x7f) << 1);
            out.push(((nr & 0x7f) << 1) | (p as u8));
        }
    }
}

fn encode_control_s(kind: SKind, nr: u8, pf: bool, width: ControlWidth, out: &mut Vec<u8>) {
    match width {
        ControlWidth::Basic => {
            let byte = ((nr & 0x7) << 5) | ((pf as u8) << 4) | (s_code(kind) << 2) | 0b01;
            out.push(byte);
        }
        ControlWidth::Extended => {
            out.push((s_code(kind) << 2) | 0b01);
            out.push(((nr & 0x7f) << 1) | (pf as u8));
        }
    }
}

fn encode_control_u(kind: UKind, pf: bool, out: &mut Vec<u8>) {
    let code = u_code(kind);
    let byte = ((code & 0b111_00) << 3) | ((pf as u8) << 4) | ((code & 0b11) << 2) | 0b11;
    out.push(byte);
}

/// Decodes a control octet (and, for modulo-128, its second octet) plus any trailing bytes as
/// payload. `width` must match the datalink's configured `v_range`.
fn decode_control<'a>(bytes: &'a [u8], width: ControlWidth) -> Result<(Frame<'a>, usize), FrameDecodeError> {
    if bytes.is_empty() {
        return Err(FrameDecodeError::TooShort { have: 0, need: 1 });
    }
    let b0 = bytes[0];
    if b0 & 0b1 == 0 {
        // I frame.
        let (ns, nr, p, consumed) = match width {
            ControlWidth::Basic => ((b0 >> 1) & 0x7, (b0 >> 5) & 0x7, (b0 >> 4) & 1 != 0, 1),
            ControlWidth::Extended => {
                if bytes.len() < 2 {
                    return Err(FrameDecodeError::TooShort { have: bytes.len(), need: 2 });
                }
                let b1 = bytes[1];
                ((b0 >> 1) & 0x7f, (b1 >> 1) & 0x7f, b1 & 1 != 0, 2)
            }
        };
        return Ok((
            Frame::I {
                nr,
                ns,
                p,
                m: false,
                payload: &bytes[consumed..],
            },
            consumed,
        ));
    }

    if b0 & 0b11 == 0b01 {
        // S frame.
        let (code, pf, nr, consumed) = match width {
            ControlWidth::Basic => ((b0 >> 2) & 0x3, (b0 >> 4) & 1 != 0, (b0 >> 5) & 0x7, 1),
            ControlWidth::Extended => {
                if bytes.len() < 2 {
                    return Err(FrameDecodeError::TooShort { have: bytes.len(), need: 2 });
                }
                let b1 = bytes[1];
                ((b0 >> 2) & 0x3, b1 & 1 != 0, (b1 >> 1) & 0x7f, 2)
            }
        };
        let kind = s_kind_from_code(code).ok_or(FrameDecodeError::UnknownControl { octet: b0 })?;
        return Ok((
            Frame::S { kind, nr, pf },
            consumed,
        ));
    }

    // U frame: code is bits 2-3 (low) and 5-7 (high).
    let u_low = (b0 >> 2) & 0x3;
    let u_high = (b0 >> 5) & 0x7;
    let pf = (b0 >> 4) & 1 != 0;
    let code = (u_high << 2) | u_low;
    let kind = u_kind_from_code(code).ok_or(FrameDecodeError::UnknownControl { octet: b0 })?;
    Ok((
        Frame::U {
            kind,
            pf,
            payload: &bytes[1..],
        },
        1,
    ))
}

/// LAPDm on-air frame format, selected by channel/link-id (spec.md §4.1).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapdmFormat {
    /// Supervisory-only, on SACCH-style channels.
    A,
    /// Normal dedicated channels: header + LI + payload + padding.
    B,
    /// BCCH/CCCH downlink UI frames: no header, payload passed transparently to L3.
    Bbis,
    /// Optional compressed form.
    Bter,
    /// SACCH with a two-octet L1 header (MS-power, timing-advance) stripped before L2 decode.
    B4,
}

/// Two-octet L1 header carried ahead of format B4 frames: MS-power and timing-advance
/// indications, surfaced to L3 via the UNIT-DATA indication rather than consumed by L2.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1Header {
    pub ms_power_level: u8,
    pub timing_advance: u8,
}

/// Padding octet used below N201 (spec.md §4.1).
pub const PADDING_OCTET: u8 = 0x2B;

/// Result of decoding a complete on-air LAPDm frame: the parsed link-layer [`Frame`], the
/// [`Address`], and (for B4) the stripped L1 header.
pub struct Decoded<'a> {
    pub address: Address,
    pub l1_header: Option<L1Header>,
    pub frame: Frame<'a>,
    /// Raw `(length, M)` from the length-indicator octet, for formats that carry one (B/B4).
    /// `None` for A/Bbis, which have no length indicator at all. Exposed separately from
    /// [`Frame`] because the M bit and a nonzero length are only ever legitimate on an I-frame;
    /// the caller maps an LI that disagrees with the frame kind to the relevant MDL-ERROR cause.
    pub li: Option<(usize, bool)>,
}

/// Decodes `bytes` under `format`, `width` (modulo-8 vs modulo-128 control octets), and `n201`.
///
/// Performs only frame-format validation (EL bit, minimum sizes, unknown control patterns);
/// length/M-bit invariants against N201 are the caller's responsibility (the FSM needs to map
/// those to specific MDL-ERROR causes per spec.md §7, not a single decode failure).
pub fn decode<'a>(
    bytes: &'a [u8],
    format: LapdmFormat,
    width: ControlWidth,
) -> Result<Decoded<'a>, FrameDecodeError> {
    match format {
        LapdmFormat::Bbis => {
            // No header at all; the whole buffer is a transparent UI payload for L3.
            return Ok(Decoded {
                address: Address::Lapdm(
                    AddressOctet::new().with_ea(true).with_sapi(Sapi::Normal).with_lpd(LPD_GSM_RADIO),
                ),
                l1_header: None,
                frame: Frame::U {
                    kind: UKind::Ui,
                    pf: false,
                    payload: bytes,
                },
                li: None,
            });
        }
        LapdmFormat::A | LapdmFormat::B | LapdmFormat::Bter | LapdmFormat::B4 => {}
    }

    let (l1_header, rest) = if format == LapdmFormat::B4 {
        if bytes.len() < 2 {
            return Err(FrameDecodeError::TooShort { have: bytes.len(), need: 2 });
        }
        (
            Some(L1Header {
                ms_power_level: bytes[0],
                timing_advance: bytes[1],
            }),
            &bytes[2..],
        )
    } else {
        (None, bytes)
    };

    if rest.is_empty() {
        return Err(FrameDecodeError::TooShort { have: 0, need: 1 });
    }
    let octet = AddressOctet::from_bytes([rest[0]]);
    let (address, rest) = if octet.ea() {
        (Address::Lapdm(octet), &rest[1..])
    } else {
        if rest.len() < 2 {
            return Err(FrameDecodeError::TooShort { have: rest.len(), need: 2 });
        }
        let tei_octet = TeiOctet::from_bytes([rest[1]]);
        if !tei_octet.ea() {
            return Err(FrameDecodeError::BadAddressExtension);
        }
        (Address::Lapd { octet, tei: tei_octet.tei() }, &rest[2..])
    };

    let needs_li = matches!(format, LapdmFormat::B | LapdmFormat::B4);
    let (payload_len, m, rest) = if needs_li {
        if rest.is_empty() {
            return Err(FrameDecodeError::TooShort { have: 0, need: 1 });
        }
        let li = LengthIndicator::from_bytes([rest[0]]);
        if !li.el() {
            return Err(FrameDecodeError::BadLengthIndicator);
        }
        (Some(li.length() as usize), li.m(), &rest[1..])
    } else {
        (None, false, rest)
    };

    let (mut frame, consumed) = decode_control(rest, width)?;
    let after_control = &rest[consumed..];

    let body = match payload_len {
        Some(len) => {
            if len > after_control.len() {
                return Err(FrameDecodeError::TooShort {
                    have: after_control.len(),
                    need: len,
                });
            }
            &after_control[..len]
        }
        None => after_control,
    };

    match &mut frame {
        Frame::I { payload, m: fm, .. } => {
            *payload = body;
            *fm = m;
        }
        Frame::U { payload, .. } => {
            *payload = body;
        }
        Frame::S { .. } => {}
    }

    let li = payload_len.map(|len| (len, m));

    Ok(Decoded { address, l1_header, frame, li })
}

/// Encodes `frame` under `address`, `format`, `width`, and `n201`, padding as needed with
/// [`PADDING_OCTET`] when the format requires a fixed-size on-air frame. `l1_header` is only
/// consulted (and required) for [`LapdmFormat::B4`].
pub fn encode(
    address: Address,
    frame: &Frame<'_>,
    format: LapdmFormat,
    width: ControlWidth,
    n201: u8,
    l1_header: Option<L1Header>,
) -> Vec<u8> {
    let mut out = Vec::new();

    if format == LapdmFormat::Bbis {
        if let Frame::U { payload, .. } = frame {
            out.extend_from_slice(payload);
        }
        return out;
    }

    if format == LapdmFormat::B4 {
        let h = l1_header.unwrap_or(L1Header {
            ms_power_level: 0,
            timing_advance: 0,
        });
        out.push(h.ms_power_level);
        out.push(h.timing_advance);
    }

    match address {
        Address::Lapdm(octet) => out.push(octet.bytes[0]),
        Address::Lapd { octet, tei } => {
            out.push(octet.bytes[0]);
            out.push(TeiOctet::new().with_ea(true).with_tei(tei).bytes[0]);
        }
    }

    let needs_li = matches!(format, LapdmFormat::B | LapdmFormat::B4);
    let payload: &[u8] = match frame {
        Frame::I { payload, .. } | Frame::U { payload, .. } => payload,
        Frame::S { .. } => &[],
    };

    if needs_li {
        let m = matches!(frame, Frame::I { m: true, .. });
        let li = LengthIndicator::new()
            .with_el(true)
            .with_m(m)
            .with_length(payload.len() as u8);
        out.push(li.bytes[0]);
    }

    match frame {
        Frame::I { ns, nr, p, .. } => encode_control_i(*ns, *nr, *p, width, &mut out),
        Frame::S { kind, nr, pf } => encode_control_s(*kind, *nr, *pf, width, &mut out),
        Frame::U { kind, pf, .. } => encode_control_u(*kind, *pf, &mut out),
    }

    out.extend_from_slice(payload);

    if needs_li {
        let n201 = n201 as usize;
        while out.len() < n201 + 2 {
            out.push(PADDING_OCTET);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(sapi: Sapi, cr_bit: bool) -> Address {
        Address::Lapdm(AddressOctet::new().with_ea(true).with_cr_bit(cr_bit).with_sapi(sapi).with_lpd(LPD_GSM_RADIO))
    }

    #[test]
    fn sabm_command_round_trips_through_format_b() {
        let frame = Frame::U {
            kind: UKind::Sabm,
            pf: true,
            payload: &[],
        };
        let bytes = encode(addr(Sapi::Normal, true), &frame, LapdmFormat::B, ControlWidth::Basic, 20, None);
        let decoded = decode(&bytes, LapdmFormat::B, ControlWidth::Basic).unwrap();
        assert_eq!(decoded.address.sapi(), Sapi::Normal);
        assert!(decoded.address.cr_bit());
        assert_eq!(decoded.frame, frame);
    }

    #[test]
    fn i_frame_round_trips_with_payload_and_padding() {
        let payload = [1u8, 2, 3, 4, 5];
        let frame = Frame::I {
            nr: 2,
            ns: 5,
            p: false,
            m: true,
            payload: &payload,
        };
        let bytes = encode(addr(Sapi::Normal, false), &frame, LapdmFormat::B, ControlWidth::Basic, 20, None);
        assert_eq!(bytes.len(), 22);
        let decoded = decode(&bytes, LapdmFormat::B, ControlWidth::Basic).unwrap();
        assert_eq!(decoded.frame, frame);
    }

    #[test]
    fn bad_length_indicator_is_rejected() {
        let addr_byte = AddressOctet::new().with_ea(true).with_cr_bit(false).with_sapi(Sapi::Normal).with_lpd(LPD_GSM_RADIO).bytes[0];
        let bytes = [addr_byte, 0b0000_0000, 0x01];
        let err = decode(&bytes, LapdmFormat::B, ControlWidth::Basic).unwrap_err();
        assert_eq!(err, FrameDecodeError::BadLengthIndicator);
    }

    #[test]
    fn bbis_is_transparent() {
        let payload = [0xAAu8; 23];
        let frame = Frame::U {
            kind: UKind::Ui,
            pf: false,
            payload: &payload,
        };
        let bytes = encode(addr(Sapi::Normal, false), &frame, LapdmFormat::Bbis, ControlWidth::Basic, 23, None);
        assert_eq!(&bytes[..], &payload[..]);
        let decoded = decode(&bytes, LapdmFormat::Bbis, ControlWidth::Basic).unwrap();
        assert_eq!(decoded.frame, frame);
    }

    #[test]
    fn extended_control_carries_full_mod128_sequence_numbers() {
        let frame = Frame::I {
            nr: 100,
            ns: 77,
            p: true,
            m: false,
            payload: &[9, 9],
        };
        let bytes = encode(addr(Sapi::Normal, false), &frame, LapdmFormat::B, ControlWidth::Extended, 120, None);
        let decoded = decode(&bytes, LapdmFormat::B, ControlWidth::Extended).unwrap();
        assert_eq!(decoded.frame, frame);
    }
}
