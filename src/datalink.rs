//! Datalink FSM (spec.md §4.2), Send/Recv Pipeline and Acknowledgement Engine (spec.md §4.3), and
//! Error Reporting (spec.md §7): one [`Datalink`] per (entity, SAPI) pair.
//!
//! Follows the pure `step(Event) -> Vec<Action>` design note from spec.md §9: nothing here ever
//! touches a clock or a PHY directly. [`Datalink::handle_event`] is the only entry point; the
//! caller supplies `now` and routes the returned [`Action`]s (and whatever frames ended up queued
//! via [`Datalink::poll_tx`]) back into the outside world.

use crate::config::{AddressMode, ChannelKind, DatalinkConfig, LinkContext, LinkMode};
use crate::error::{MdlErrorCause, ReleaseCause};
use crate::frame::{self, Address, AddressOctet, Cr, Frame, LPD_GSM_RADIO, SKind, Sapi, UKind};
use crate::history::{Entry, TxHistory};
use crate::primitives::{Action, DlIndication, DlRequest, Event, ReleaseMode};
use crate::timer::{Timer, TimerKind};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use embedded_time::{Clock, Instant};

/// Datalink state (spec.md §4.2). `NULL` and `IDLE` are kept distinct even though they behave
/// identically here (`NULL` = never configured; `IDLE` = configured, not established) because only
/// `IDLE` accepts `DL-EST.req`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Null,
    Idle,
    SabmSent,
    DiscSent,
    MfEst,
    TimerRecov,
}

/// A pending outbound L3 message being segmented across successive I-frames.
#[derive(Debug, Clone)]
struct SendBuffer {
    payload: Vec<u8>,
    send_out: usize,
}

fn inc_mod(v: u8, range: u8) -> u8 {
    (v + 1) % range
}

fn add_mod(a: u8, b: u8, range: u8) -> u8 {
    ((a as u16 + b as u16) % range as u16) as u8
}

fn sub_mod(a: u8, b: u8, range: u8) -> u8 {
    ((a as i16 - b as i16).rem_euclid(range as i16)) as u8
}

/// One GSM LAPDm/LAPD data-link instance: the FSM, send/recv pipeline, acknowledgement engine,
/// and per-link queues/history/timers described across spec.md §3-§4.
pub struct Datalink<C: Clock> {
    config: DatalinkConfig,
    sapi: Sapi,
    lctx: Option<LinkContext>,
    state: State,

    v_s: u8,
    v_a: u8,
    v_r: u8,
    retrans: u8,
    own_busy: bool,
    peer_busy: bool,
    /// 0 = no sequence error outstanding, 1 = one REJ already sent for the current gap, 2 =
    /// further REJs suppressed until an in-sequence I-frame arrives (spec.md §4.3).
    seq_err_cond: u8,

    send_queue: VecDeque<Vec<u8>>,
    send_buffer: Option<SendBuffer>,
    rcv_buffer: Option<Vec<u8>>,
    tx_history: TxHistory,
    /// Frames ready for the PHY, in send order; drained by the owning [`crate::entity::Entity`].
    tx_queue: VecDeque<Vec<u8>>,

    t200: Timer<C>,
    t203: Timer<C>,

    /// Network-side only: the contention-resolution payload from the SABM that established this
    /// link, retained for the lifetime of MF_EST/TIMER_RECOV so a duplicate SABM can be matched
    /// (spec.md §4.2 contention resolution, S5).
    contention_buffer: Option<Vec<u8>>,
}

impl<C: Clock> Datalink<C> {
    pub fn new(sapi: Sapi, config: DatalinkConfig) -> Self {
        let range_hist = config.range_hist();
        Datalink {
            config,
            sapi,
            lctx: None,
            state: State::Null,
            v_s: 0,
            v_a: 0,
            v_r: 0,
            retrans: 0,
            own_busy: false,
            peer_busy: false,
            seq_err_cond: 0,
            send_queue: VecDeque::new(),
            send_buffer: None,
            rcv_buffer: None,
            tx_history: TxHistory::new(range_hist),
            tx_queue: VecDeque::new(),
            t200: Timer::new(),
            t203: Timer::new(),
            contention_buffer: None,
        }
    }

    pub fn sapi(&self) -> Sapi {
        self.sapi
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Pops the next frame ready for the PHY, if any. Called by the owning
    /// [`crate::entity::Entity`] as it drains its round-robin across datalinks.
    pub fn poll_tx(&mut self) -> Option<Vec<u8>> {
        self.tx_queue.pop_front()
    }

    pub fn has_pending_tx(&self) -> bool {
        !self.tx_queue.is_empty()
    }

    /// Advances the FSM by one `event`, observed at `now`. Returns the timer/indication actions
    /// the caller must carry out; any frames to send are appended to the internal tx-queue and
    /// surface through [`Datalink::poll_tx`] instead.
    pub fn handle_event(&mut self, event: Event, now: Instant<C>) -> Vec<Action> {
        match event {
            Event::Configure { channel } => {
                self.configure(channel);
                Vec::new()
            }
            Event::Request(req) => self.handle_request(req, now),
            Event::FrameReceived { bytes } => self.handle_phy_bytes(&bytes, now),
            Event::TimerExpired(kind) => self.handle_timer(kind, now),
        }
    }

    fn configure(&mut self, channel: ChannelKind) {
        self.lctx = Some(LinkContext::new(channel, self.config.v_range, self.config.address_mode));
        if self.state == State::Null {
            self.state = State::Idle;
        }
    }

    // ---- address/encode helpers -------------------------------------------------------------

    fn build_address(&self, cr: Cr) -> Address {
        let own_command = self.config.mode.own_command_cr_bit();
        let cr_bit = match cr {
            Cr::Command => own_command,
            Cr::Response => !own_command,
        };
        let octet = AddressOctet::new()
            .with_ea(matches!(self.config.address_mode, AddressMode::Lapdm))
            .with_cr_bit(cr_bit)
            .with_sapi(self.sapi)
            .with_lpd(LPD_GSM_RADIO);
        match self.config.address_mode {
            AddressMode::Lapdm => Address::Lapdm(octet),
            AddressMode::Lapd { tei } => Address::Lapd { octet, tei },
        }
    }

    fn encode_frame(&self, frame: &Frame<'_>, cr: Cr) -> Vec<u8> {
        let lctx = self.lctx.expect("datalink configured before frame I/O");
        frame::encode(self.build_address(cr), frame, lctx.format, lctx.width, lctx.n201, None)
    }

    fn is_peer_command(&self, address: &Address) -> bool {
        address.cr_bit() == self.config.mode.peer_command_cr_bit()
    }

    // ---- outgoing frame builders --------------------------------------------------------------

    fn send_dm(&mut self, pf: bool) {
        let frame = Frame::U { kind: UKind::Dm, pf, payload: &[] };
        let bytes = self.encode_frame(&frame, Cr::Response);
        self.tx_queue.push_back(bytes);
    }

    fn send_ua(&mut self, pf: bool, payload: &[u8]) {
        let frame = Frame::U { kind: UKind::Ua, pf, payload };
        let bytes = self.encode_frame(&frame, Cr::Response);
        self.tx_queue.push_back(bytes);
    }

    fn send_sabm(&mut self, payload: &[u8], now: Instant<C>, actions: &mut Vec<Action>) {
        let kind = if self.config.use_sabme { UKind::Sabme } else { UKind::Sabm };
        let frame = Frame::U { kind, pf: true, payload };
        let bytes = self.encode_frame(&frame, Cr::Command);
        self.tx_queue.push_back(bytes);
        self.retrans = 0;
        // `restart`, not `start`: this also runs on T200-expiry retransmission, when the timer is
        // still "running" with an already-past deadline.
        self.t200.restart(now, self.config.t200);
        actions.push(Action::StartTimer { kind: TimerKind::T200 });
    }

    fn send_disc(&mut self, now: Instant<C>, actions: &mut Vec<Action>) {
        let frame = Frame::U { kind: UKind::Disc, pf: true, payload: &[] };
        let bytes = self.encode_frame(&frame, Cr::Command);
        self.tx_queue.push_back(bytes);
        self.retrans = 0;
        self.t200.restart(now, self.config.t200);
        actions.push(Action::StartTimer { kind: TimerKind::T200 });
    }

    fn send_rr_or_rnr(&mut self, pf: bool) {
        let kind = if self.own_busy { SKind::Rnr } else { SKind::Rr };
        let frame = Frame::S { kind, nr: self.v_r, pf };
        let bytes = self.encode_frame(&frame, Cr::Response);
        self.tx_queue.push_back(bytes);
    }

    fn send_rej(&mut self, pf: bool) {
        let frame = Frame::S { kind: SKind::Rej, nr: self.v_r, pf };
        let bytes = self.encode_frame(&frame, Cr::Response);
        self.tx_queue.push_back(bytes);
    }

    // ---- bookkeeping shared by several transitions --------------------------------------------

    fn reset_sequence_state(&mut self) {
        self.v_s = 0;
        self.v_a = 0;
        self.v_r = 0;
        self.retrans = 0;
        self.own_busy = false;
        self.peer_busy = false;
        self.seq_err_cond = 0;
        self.tx_history.clear();
        self.tx_queue.clear();
    }

    fn teardown(&mut self, actions: &mut Vec<Action>) {
        if self.t200.is_running() {
            self.t200.stop();
            actions.push(Action::StopTimer { kind: TimerKind::T200 });
        }
        if self.t203.is_running() {
            self.t203.stop();
            actions.push(Action::StopTimer { kind: TimerKind::T203 });
        }
        self.tx_queue.clear();
        self.tx_history.clear();
        self.send_buffer = None;
        self.send_queue.clear();
        self.rcv_buffer = None;
        self.contention_buffer = None;
    }

    fn start_t203_if_enabled(&mut self, now: Instant<C>, actions: &mut Vec<Action>) {
        if let Some(duration) = self.config.t203 {
            if !self.t203.is_running() {
                self.t203.start(now, duration);
                actions.push(Action::StartTimer { kind: TimerKind::T203 });
            }
        }
    }

    fn exit_timer_recov(&mut self, now: Instant<C>, actions: &mut Vec<Action>) {
        self.state = State::MfEst;
        self.retrans = 0;
        self.start_t203_if_enabled(now, actions);
    }

    fn reestablish(&mut self, now: Instant<C>, actions: &mut Vec<Action>) {
        self.reset_sequence_state();
        self.t203.stop();
        self.send_sabm(&[], now, actions);
        self.state = State::SabmSent;
    }

    // ---- send pipeline (spec.md §4.3) ----------------------------------------------------------

    /// Drains as much of `send_queue`/`send_buffer` as the window allows, segmenting at N201-3
    /// octets per frame and replaying any still-populated tx-history slot in place (the post-REJ
    /// case, where V(S) was rewound behind frames that are still genuinely unacknowledged).
    fn drain_send(&mut self, now: Instant<C>, actions: &mut Vec<Action>) {
        loop {
            if self.peer_busy || self.state == State::TimerRecov {
                return;
            }
            let v_range = self.config.v_range.value();
            if self.v_s == add_mod(self.v_a, self.config.k, v_range) {
                return;
            }

            let (ns, more, payload) = if let Some(entry) = self.tx_history.get(self.v_s) {
                (entry.ns, entry.more, entry.payload.clone())
            } else {
                if self.send_buffer.is_none() {
                    match self.send_queue.pop_front() {
                        Some(msg) => self.send_buffer = Some(SendBuffer { payload: msg, send_out: 0 }),
                        None => return,
                    }
                }
                let n201 = self.lctx.expect("configured").n201 as usize;
                let max_chunk = n201.saturating_sub(3).max(1);
                let buf = self.send_buffer.as_mut().unwrap();
                let remaining = buf.payload.len() - buf.send_out;
                let take = remaining.min(max_chunk);
                let chunk = buf.payload[buf.send_out..buf.send_out + take].to_vec();
                let more = buf.send_out + take < buf.payload.len();
                let ns = self.v_s;
                self.tx_history.insert(ns, Entry { ns, more, payload: chunk.clone() });
                buf.send_out += take;
                if buf.send_out >= buf.payload.len() {
                    self.send_buffer = None;
                }
                (ns, more, chunk)
            };

            let frame = Frame::I { nr: self.v_r, ns, p: false, m: more, payload: &payload };
            let bytes = self.encode_frame(&frame, Cr::Command);
            self.tx_queue.push_back(bytes);

            self.v_s = inc_mod(self.v_s, v_range);
            if !self.t200.is_running() {
                self.t200.start(now, self.config.t200);
                actions.push(Action::StartTimer { kind: TimerKind::T200 });
            }
            if self.t203.is_running() {
                self.t203.stop();
                actions.push(Action::StopTimer { kind: TimerKind::T203 });
            }
        }
    }

    /// T200-expiry retransmission while in TIMER_RECOV: the last unacked I-frame with P=1, or a
    /// supervisory poll if the window is fully acknowledged (spec.md §4.4).
    fn retransmit_or_poll(&mut self) {
        if self.v_s != self.v_a {
            let v_range = self.config.v_range.value();
            let last = sub_mod(self.v_s, 1, v_range);
            if let Some(entry) = self.tx_history.get(last) {
                let frame = Frame::I { nr: self.v_r, ns: entry.ns, p: true, m: entry.more, payload: &entry.payload };
                let bytes = self.encode_frame(&frame, Cr::Command);
                self.tx_queue.push_back(bytes);
            }
        } else {
            self.send_rr_or_rnr(true);
        }
    }

    // ---- acknowledgement engine (spec.md §4.3) -------------------------------------------------

    fn apply_ack(&mut self, nr: u8, is_rej: bool, now: Instant<C>, actions: &mut Vec<Action>) {
        let v_range = self.config.v_range.value();

        let mut i = self.v_a;
        while i != nr {
            self.tx_history.release(i);
            i = inc_mod(i, v_range);
        }

        let mut stopped_t200 = false;
        if self.state != State::TimerRecov {
            let progressed = nr != self.v_a;
            if (progressed && !is_rej) || (is_rej && nr == self.v_a) {
                if self.t200.is_running() {
                    self.t200.stop();
                    actions.push(Action::StopTimer { kind: TimerKind::T200 });
                    stopped_t200 = true;
                }
            }
        }

        let gap_nr = sub_mod(nr, self.v_a, v_range);
        let gap_vs = sub_mod(self.v_s, self.v_a, v_range);
        if gap_nr > gap_vs {
            actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::SeqErr }));
        }

        self.v_a = nr;

        let outstanding = self.v_s != self.v_a;
        if stopped_t200 && outstanding && !is_rej {
            self.t200.start(now, self.config.t200);
            actions.push(Action::StartTimer { kind: TimerKind::T200 });
        }

        if self.state == State::MfEst && !self.t200.is_running() {
            if let Some(duration) = self.config.t203 {
                if !self.t203.is_running() {
                    self.t203.start(now, duration);
                    actions.push(Action::StartTimer { kind: TimerKind::T203 });
                }
            }
        }
    }

    // ---- requests from L3 (DL-SAP, spec.md §6) -------------------------------------------------

    fn handle_request(&mut self, req: DlRequest, now: Instant<C>) -> Vec<Action> {
        let mut actions = Vec::new();
        match req {
            DlRequest::Establish { payload } => match self.state {
                State::Null | State::Idle => {
                    self.reset_sequence_state();
                    let payload = payload.unwrap_or_default();
                    self.send_sabm(&payload, now, &mut actions);
                    self.state = State::SabmSent;
                }
                _ => {}
            },
            DlRequest::Data { payload } => {
                self.send_queue.push_back(payload);
                if self.state == State::MfEst {
                    self.drain_send(now, &mut actions);
                }
            }
            DlRequest::UnitData { payload } => {
                let frame = Frame::U { kind: UKind::Ui, pf: false, payload: &payload };
                let bytes = self.encode_frame(&frame, Cr::Command);
                self.tx_queue.push_back(bytes);
            }
            DlRequest::Release { mode } => match mode {
                ReleaseMode::Local => {
                    self.teardown(&mut actions);
                    self.state = State::Idle;
                    actions.push(Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Local }));
                }
                ReleaseMode::Normal => match self.state {
                    State::MfEst | State::TimerRecov | State::SabmSent => {
                        self.send_disc(now, &mut actions);
                        self.state = State::DiscSent;
                    }
                    _ => {
                        actions.push(Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Normal }));
                    }
                },
            },
            DlRequest::Suspend => {
                if let Some(buf) = self.send_buffer.take() {
                    self.send_queue.push_front(buf.payload);
                }
                self.tx_queue.clear();
                self.tx_history.clear();
                if self.t200.is_running() {
                    self.t200.stop();
                    actions.push(Action::StopTimer { kind: TimerKind::T200 });
                }
                if self.t203.is_running() {
                    self.t203.stop();
                    actions.push(Action::StopTimer { kind: TimerKind::T203 });
                }
                actions.push(Action::Indicate(DlIndication::SuspendConfirm));
            }
            DlRequest::Resume { payload } | DlRequest::Reconnect { payload } => {
                if let Some(payload) = payload {
                    self.send_buffer = Some(SendBuffer { payload, send_out: 0 });
                }
                self.reset_sequence_state();
                self.send_sabm(&[], now, &mut actions);
                self.state = State::SabmSent;
            }
        }
        actions
    }

    // ---- timer expiry (spec.md §4.4) -----------------------------------------------------------

    fn handle_timer(&mut self, kind: TimerKind, now: Instant<C>) -> Vec<Action> {
        let mut actions = Vec::new();
        match kind {
            TimerKind::T200 => match self.state {
                State::SabmSent => {
                    self.retrans += 1;
                    if self.retrans >= self.config.n200_est_rel {
                        self.t200.stop();
                        self.teardown(&mut actions);
                        self.state = State::Idle;
                        actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::T200Expired }));
                        actions.push(Action::Indicate(DlIndication::ReleaseIndication { cause: ReleaseCause::Timeout }));
                    } else {
                        self.send_sabm(&[], now, &mut actions);
                    }
                }
                State::DiscSent => {
                    self.retrans += 1;
                    if self.retrans >= self.config.n200_est_rel {
                        self.t200.stop();
                        self.teardown(&mut actions);
                        self.state = State::Idle;
                        actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::T200Expired }));
                        actions.push(Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Timeout }));
                    } else {
                        self.send_disc(now, &mut actions);
                    }
                }
                State::MfEst => {
                    self.state = State::TimerRecov;
                    self.retrans = 0;
                    if self.t203.is_running() {
                        self.t203.stop();
                        actions.push(Action::StopTimer { kind: TimerKind::T203 });
                    }
                    self.retransmit_or_poll();
                    self.t200.restart(now, self.config.t200);
                    actions.push(Action::StartTimer { kind: TimerKind::T200 });
                }
                State::TimerRecov => {
                    self.retrans += 1;
                    if self.retrans < self.config.n200 {
                        self.retransmit_or_poll();
                        self.t200.restart(now, self.config.t200);
                        actions.push(Action::StartTimer { kind: TimerKind::T200 });
                    } else {
                        actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::T200Expired }));
                        if self.config.reestablish {
                            self.reestablish(now, &mut actions);
                        }
                    }
                }
                State::Null | State::Idle => {}
            },
            TimerKind::T203 => {
                if self.state == State::MfEst {
                    self.t203.stop();
                    self.state = State::TimerRecov;
                    self.retrans = 0;
                    self.send_rr_or_rnr(true);
                    self.t200.start(now, self.config.t200);
                    actions.push(Action::StartTimer { kind: TimerKind::T200 });
                }
            }
        }
        actions
    }

    // ---- receive path (spec.md §4.3) -----------------------------------------------------------

    fn handle_phy_bytes(&mut self, bytes: &[u8], now: Instant<C>) -> Vec<Action> {
        let lctx = match self.lctx {
            Some(lctx) => lctx,
            None => return Vec::new(),
        };
        let decoded = match frame::decode(bytes, lctx.format, lctx.width) {
            Ok(decoded) => decoded,
            Err(_) => {
                return vec![Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::FrmUnimpl })];
            }
        };
        let is_command = self.is_peer_command(&decoded.address);
        match decoded.frame {
            Frame::I { nr, ns, p, m, payload } => self.handle_i_frame(is_command, ns, nr, p, m, payload, now),
            Frame::S { kind, nr, pf } => self.handle_s_frame(kind, nr, pf, is_command, decoded.li, now),
            Frame::U { kind, pf, payload } => self.handle_u_frame(is_command, kind, pf, payload, decoded.li, now),
        }
    }

    fn handle_u_frame(
        &mut self,
        is_command: bool,
        kind: UKind,
        pf: bool,
        payload: &[u8],
        li: Option<(usize, bool)>,
        now: Instant<C>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        let n201 = self.lctx.map(|lctx| lctx.n201 as usize).unwrap_or(usize::MAX);
        // U-frames never segment (only I-frames do), so M=1 is always malformed; a length over
        // N201 is malformed for any kind, and an information field at all is only ever legitimate
        // on UI/SABM/SABME/UA (spec.md §7 UFRM_INC_PARAM).
        if let Some((len, m)) = li {
            let payload_allowed = matches!(kind, UKind::Ui | UKind::Sabm | UKind::Sabme | UKind::Ua);
            if m || len > n201 || (len > 0 && !payload_allowed) {
                actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::UFrmIncParam }));
                return actions;
            }
        }
        match kind {
            UKind::Ui => {
                actions.push(Action::Indicate(DlIndication::UnitDataIndication { payload: payload.to_vec() }));
            }
            UKind::Sabm | UKind::Sabme => {
                if !is_command {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::FrmUnimpl }));
                } else {
                    self.handle_sabm(payload, pf, now, &mut actions);
                }
            }
            UKind::Disc => {
                if !is_command {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::FrmUnimpl }));
                } else {
                    self.handle_disc(pf, &mut actions);
                }
            }
            UKind::Ua => {
                if is_command {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::FrmUnimpl }));
                } else if pf {
                    self.handle_ua(now, &mut actions);
                }
            }
            UKind::Dm => {
                if is_command {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::FrmUnimpl }));
                } else {
                    self.handle_dm(pf, now, &mut actions);
                }
            }
            UKind::Frmr => {
                actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::Frmr }));
            }
        }
        actions
    }

    fn handle_sabm(&mut self, payload: &[u8], p: bool, now: Instant<C>, actions: &mut Vec<Action>) {
        match self.state {
            State::Null => {}
            State::Idle => {
                self.reset_sequence_state();
                if self.config.mode == LinkMode::Network && !payload.is_empty() {
                    self.contention_buffer = Some(payload.to_vec());
                }
                self.send_ua(p, payload);
                self.state = State::MfEst;
                self.start_t203_if_enabled(now, actions);
                actions.push(Action::Indicate(DlIndication::EstablishIndication {
                    payload: if payload.is_empty() { None } else { Some(payload.to_vec()) },
                }));
            }
            State::SabmSent => {
                self.send_ua(p, payload);
            }
            State::DiscSent => {
                self.send_dm(p);
            }
            State::MfEst | State::TimerRecov => {
                if self.config.mode != LinkMode::Network {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::SabmMf }));
                    return;
                }
                match &self.contention_buffer {
                    Some(stored) if stored.as_slice() == payload => self.send_ua(p, payload),
                    Some(_) => { /* differing contention payload: duplicate silently dropped, S5 */ }
                    None if payload.is_empty() => {
                        actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::SabmMf }));
                    }
                    None => {
                        actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::SabmInfoNotall }));
                    }
                }
            }
        }
    }

    fn handle_disc(&mut self, p: bool, actions: &mut Vec<Action>) {
        match self.state {
            State::Null => {}
            State::Idle => {
                self.send_ua(p, &[]);
                actions.push(Action::Indicate(DlIndication::ReleaseIndication { cause: ReleaseCause::Normal }));
            }
            State::SabmSent => self.send_dm(p),
            State::DiscSent => {
                // Collision: our own DISC crossed the peer's. Treat it as satisfying our pending
                // release rather than replying DM, per S6.
                self.send_ua(p, &[]);
                self.teardown(actions);
                self.state = State::Idle;
                actions.push(Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Normal }));
            }
            State::MfEst | State::TimerRecov => {
                self.send_ua(p, &[]);
                self.teardown(actions);
                self.state = State::Idle;
                actions.push(Action::Indicate(DlIndication::ReleaseIndication { cause: ReleaseCause::Normal }));
            }
        }
    }

    fn handle_ua(&mut self, now: Instant<C>, actions: &mut Vec<Action>) {
        match self.state {
            State::SabmSent => {
                self.t200.stop();
                actions.push(Action::StopTimer { kind: TimerKind::T200 });
                self.state = State::MfEst;
                actions.push(Action::Indicate(DlIndication::EstablishConfirm));
                self.start_t203_if_enabled(now, actions);
                self.drain_send(now, actions);
            }
            State::DiscSent => {
                self.t200.stop();
                actions.push(Action::StopTimer { kind: TimerKind::T200 });
                self.teardown(actions);
                self.state = State::Idle;
                actions.push(Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Normal }));
            }
            State::MfEst | State::TimerRecov => {
                actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::UnsolUaResp }));
            }
            State::Null | State::Idle => {}
        }
    }

    fn handle_dm(&mut self, pf: bool, now: Instant<C>, actions: &mut Vec<Action>) {
        match self.state {
            State::SabmSent => {
                self.t200.stop();
                actions.push(Action::StopTimer { kind: TimerKind::T200 });
                self.teardown(actions);
                self.state = State::Idle;
                actions.push(Action::Indicate(DlIndication::ReleaseIndication { cause: ReleaseCause::Normal }));
            }
            State::DiscSent => {
                self.t200.stop();
                actions.push(Action::StopTimer { kind: TimerKind::T200 });
                self.teardown(actions);
                self.state = State::Idle;
                actions.push(Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Normal }));
            }
            State::MfEst | State::TimerRecov => {
                if pf {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::UnsolDmResp }));
                    if self.config.reestablish {
                        self.reestablish(now, actions);
                    }
                } else {
                    actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::UnsolDmRespMf }));
                }
            }
            State::Null | State::Idle => {}
        }
    }

    fn handle_s_frame(
        &mut self,
        kind: SKind,
        nr: u8,
        pf: bool,
        is_command: bool,
        li: Option<(usize, bool)>,
        now: Instant<C>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        match self.state {
            State::Null | State::Idle => {
                if is_command && pf {
                    self.send_dm(true);
                }
                return actions;
            }
            State::SabmSent | State::DiscSent => return actions,
            State::MfEst | State::TimerRecov => {}
        }

        // S-frames never carry an information field (spec.md §7 SFRM_INC_PARAM).
        if let Some((len, m)) = li {
            if len > 0 || m {
                actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::SFrmIncParam }));
                return actions;
            }
        }

        if !is_command && pf && self.state == State::MfEst {
            actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::UnsolSprvResp }));
            return actions;
        }

        match kind {
            SKind::Rr => {
                self.peer_busy = false;
                self.apply_ack(nr, false, now, &mut actions);
            }
            SKind::Rnr => {
                self.peer_busy = true;
                self.apply_ack(nr, false, now, &mut actions);
                // An RNR response with F=1 received in TIMER_RECOV both exits recovery and rewinds
                // V(S) to N(R) (spec.md §4.3), same as REJ's unconditional rewind above.
                if !is_command && pf && self.state == State::TimerRecov {
                    self.v_s = nr;
                }
            }
            SKind::Rej => {
                self.peer_busy = false;
                self.apply_ack(nr, true, now, &mut actions);
                self.v_s = nr;
                if self.t200.is_running() {
                    self.t200.stop();
                    actions.push(Action::StopTimer { kind: TimerKind::T200 });
                }
            }
        }

        if !is_command && pf && self.state == State::TimerRecov {
            self.exit_timer_recov(now, &mut actions);
        }

        if is_command && pf {
            self.send_rr_or_rnr(true);
        }

        self.drain_send(now, &mut actions);
        actions
    }

    fn handle_i_frame(
        &mut self,
        is_command: bool,
        ns: u8,
        nr: u8,
        p: bool,
        m: bool,
        payload: &[u8],
        now: Instant<C>,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if !is_command {
            actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::FrmUnimpl }));
            return actions;
        }

        match self.state {
            State::Null | State::SabmSent | State::DiscSent => return actions,
            State::Idle => {
                if p {
                    self.send_dm(true);
                }
                return actions;
            }
            State::MfEst | State::TimerRecov => {}
        }

        let n201 = self.lctx.expect("configured").n201 as usize;
        if payload.is_empty() || payload.len() > n201 {
            actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::IFrmIncLen }));
            return actions;
        }
        if payload.len() < n201 && m {
            actions.push(Action::Indicate(DlIndication::MdlError { cause: MdlErrorCause::IFrmIncMbits }));
            return actions;
        }

        let v_range = self.config.v_range.value();
        if ns != self.v_r {
            // The REJ itself (carrying the peer's P echoed as F) is the complete response to this
            // frame; no separate RR/RNR poll-answer is needed.
            if self.seq_err_cond == 0 {
                self.send_rej(p);
                self.seq_err_cond = 1;
            } else {
                self.seq_err_cond = 2;
            }
            self.apply_ack(nr, false, now, &mut actions);
            return actions;
        }

        self.seq_err_cond = 0;
        self.v_r = inc_mod(self.v_r, v_range);
        self.apply_ack(nr, false, now, &mut actions);

        if self.own_busy {
            // Delivery suppressed while busy; N(R)/V(R) bookkeeping above still applies.
        } else if !m && self.rcv_buffer.is_none() {
            actions.push(Action::Indicate(DlIndication::DataIndication { payload: payload.to_vec() }));
        } else {
            let buf = self.rcv_buffer.get_or_insert_with(Vec::new);
            if buf.len() + payload.len() <= self.config.maxf {
                buf.extend_from_slice(payload);
            }
            if !m {
                let complete = self.rcv_buffer.take().unwrap_or_default();
                actions.push(Action::Indicate(DlIndication::DataIndication { payload: complete }));
            }
        }

        if p {
            self.send_rr_or_rnr(true);
        } else {
            let before = self.tx_queue.len();
            self.drain_send(now, &mut actions);
            if self.tx_queue.len() == before {
                self.send_rr_or_rnr(false);
            }
        }

        actions
    }
}
