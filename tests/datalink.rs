//! End-to-end scenarios from spec.md §8 (S1-S6), exercised directly against [`lapdm::Datalink`].

use embedded_time::clock::Error as ClockError;
use embedded_time::fraction::Fraction;
use embedded_time::{Clock, Instant};
use lapdm::config::{ChannelKind, DatalinkConfig, LinkMode};
use lapdm::frame::{self, Address, AddressOctet, Cr, ControlWidth, Frame, LapdmFormat, SKind, Sapi, UKind, LPD_GSM_RADIO};
use lapdm::{Action, Datalink, DlIndication, DlRequest, Event, MdlErrorCause, ReleaseCause, State, TimerKind};

#[derive(Debug)]
struct TestClock;

impl Clock for TestClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

    fn try_now(&self) -> Result<Instant<Self>, ClockError> {
        Ok(Instant::new(0))
    }
}

fn tick(ms: u64) -> Instant<TestClock> {
    Instant::new(ms)
}

fn addr(mode: LinkMode, cr: Cr) -> Address {
    let own_command = matches!(mode, LinkMode::Network);
    let cr_bit = match cr {
        Cr::Command => own_command,
        Cr::Response => !own_command,
    };
    Address::Lapdm(
        AddressOctet::new()
            .with_ea(true)
            .with_cr_bit(cr_bit)
            .with_sapi(Sapi::Normal)
            .with_lpd(LPD_GSM_RADIO),
    )
}

fn encode(mode: LinkMode, frame: &Frame<'_>, cr: Cr) -> Vec<u8> {
    frame::encode(addr(mode, cr), frame, LapdmFormat::B, ControlWidth::Basic, 20, None)
}

fn fresh(mode: LinkMode) -> Datalink<TestClock> {
    let mut dl = Datalink::new(Sapi::Normal, DatalinkConfig::new(mode));
    dl.handle_event(Event::Configure { channel: ChannelKind::Sdcch }, tick(0));
    dl
}

fn find_mdl_error(actions: &[Action]) -> Option<MdlErrorCause> {
    actions.iter().find_map(|a| match a {
        Action::Indicate(DlIndication::MdlError { cause }) => Some(*cause),
        _ => None,
    })
}

#[test]
fn s1_normal_establishment() {
    let mut ms = fresh(LinkMode::User);

    let actions = ms.handle_event(Event::Request(DlRequest::Establish { payload: None }), tick(0));
    assert!(actions.iter().any(|a| matches!(a, Action::StartTimer { kind: TimerKind::T200 })));
    let sabm = ms.poll_tx().expect("SABM queued");
    assert!(ms.poll_tx().is_none());

    let decoded = frame::decode(&sabm, LapdmFormat::B, ControlWidth::Basic).unwrap();
    assert!(matches!(decoded.frame, Frame::U { kind: UKind::Sabm, pf: true, .. }));

    let ua = encode(LinkMode::Network, &Frame::U { kind: UKind::Ua, pf: true, payload: &[] }, Cr::Response);
    let actions = ms.handle_event(Event::FrameReceived { bytes: ua }, tick(50));
    assert!(actions.iter().any(|a| matches!(a, Action::Indicate(DlIndication::EstablishConfirm))));
    assert_eq!(ms.state(), State::MfEst);
}

#[test]
fn s2_segmented_data_paces_one_frame_per_ack() {
    let mut ms = fresh(LinkMode::User);
    ms.handle_event(Event::Request(DlRequest::Establish { payload: None }), tick(0));
    let sabm = ms.poll_tx().unwrap();
    let _ = sabm;
    let ua = encode(LinkMode::Network, &Frame::U { kind: UKind::Ua, pf: true, payload: &[] }, Cr::Response);
    ms.handle_event(Event::FrameReceived { bytes: ua }, tick(10));
    assert_eq!(ms.state(), State::MfEst);

    let message: std::vec::Vec<u8> = (0..45u32).map(|v| v as u8).collect();
    ms.handle_event(Event::Request(DlRequest::Data { payload: message.clone() }), tick(20));

    let first = ms.poll_tx().expect("first I-frame");
    assert!(ms.poll_tx().is_none(), "window of 1 blocks the second segment");
    let decoded = frame::decode(&first, LapdmFormat::B, ControlWidth::Basic).unwrap();
    match decoded.frame {
        Frame::I { ns, m, payload, .. } => {
            assert_eq!(ns, 0);
            assert!(m);
            assert_eq!(payload.len(), 17);
        }
        _ => panic!("expected I-frame"),
    }

    let ack1 = encode(LinkMode::Network, &Frame::S { kind: SKind::Rr, nr: 1, pf: false }, Cr::Response);
    ms.handle_event(Event::FrameReceived { bytes: ack1 }, tick(30));
    let second = ms.poll_tx().expect("second I-frame");
    let decoded = frame::decode(&second, LapdmFormat::B, ControlWidth::Basic).unwrap();
    match decoded.frame {
        Frame::I { ns, m, payload, .. } => {
            assert_eq!(ns, 1);
            assert!(m);
            assert_eq!(payload.len(), 17);
        }
        _ => panic!("expected I-frame"),
    }

    let ack2 = encode(LinkMode::Network, &Frame::S { kind: SKind::Rr, nr: 2, pf: false }, Cr::Response);
    ms.handle_event(Event::FrameReceived { bytes: ack2 }, tick(40));
    let third = ms.poll_tx().expect("third I-frame");
    let decoded = frame::decode(&third, LapdmFormat::B, ControlWidth::Basic).unwrap();
    match decoded.frame {
        Frame::I { ns, m, payload, .. } => {
            assert_eq!(ns, 2);
            assert!(!m);
            assert_eq!(payload.len(), 11);
        }
        _ => panic!("expected I-frame"),
    }
}

#[test]
fn s3_retransmission_on_t200_enters_timer_recov_then_gives_up() {
    let mut ms = fresh(LinkMode::User);
    ms.handle_event(Event::Request(DlRequest::Establish { payload: None }), tick(0));
    ms.poll_tx().unwrap();
    let ua = encode(LinkMode::Network, &Frame::U { kind: UKind::Ua, pf: true, payload: &[] }, Cr::Response);
    ms.handle_event(Event::FrameReceived { bytes: ua }, tick(10));

    ms.handle_event(Event::Request(DlRequest::Data { payload: std::vec![1, 2, 3] }), tick(20));
    ms.poll_tx().expect("I-frame sent");

    let actions = ms.handle_event(Event::TimerExpired(TimerKind::T200), tick(1020));
    assert_eq!(ms.state(), State::TimerRecov);
    assert!(actions.iter().any(|a| matches!(a, Action::StartTimer { kind: TimerKind::T200 })));
    let retransmit = ms.poll_tx().expect("I-frame retransmitted with P=1");
    let decoded = frame::decode(&retransmit, LapdmFormat::B, ControlWidth::Basic).unwrap();
    assert!(matches!(decoded.frame, Frame::I { p: true, ns: 0, .. }));

    // Three more expiries exhaust N200 (default 3) counting from the recovery entry's own retry.
    ms.handle_event(Event::TimerExpired(TimerKind::T200), tick(2020));
    ms.poll_tx();
    ms.handle_event(Event::TimerExpired(TimerKind::T200), tick(3020));
    ms.poll_tx();
    let actions = ms.handle_event(Event::TimerExpired(TimerKind::T200), tick(4020));
    assert_eq!(find_mdl_error(&actions), Some(MdlErrorCause::T200Expired));
}

#[test]
fn s4_sequence_error_rejects_once_then_suppresses() {
    let mut net = fresh(LinkMode::Network);
    let sabm = encode(LinkMode::User, &Frame::U { kind: UKind::Sabm, pf: true, payload: &[] }, Cr::Command);
    net.handle_event(Event::FrameReceived { bytes: sabm }, tick(0));
    assert_eq!(net.state(), State::MfEst);

    let out_of_seq = encode(LinkMode::User, &Frame::I { nr: 0, ns: 1, p: false, m: false, payload: &[9] }, Cr::Command);
    let actions = net.handle_event(Event::FrameReceived { bytes: out_of_seq.clone() }, tick(10));
    assert!(actions.is_empty() || !find_mdl_error(&actions).is_some());
    let rej = net.poll_tx().expect("REJ emitted");
    let decoded = frame::decode(&rej, LapdmFormat::B, ControlWidth::Basic).unwrap();
    assert!(matches!(decoded.frame, Frame::S { kind: SKind::Rej, nr: 0, .. }));

    net.handle_event(Event::FrameReceived { bytes: out_of_seq }, tick(20));
    assert!(net.poll_tx().is_none(), "second out-of-sequence I-frame must not re-trigger REJ");

    let in_seq = encode(LinkMode::User, &Frame::I { nr: 0, ns: 0, p: false, m: false, payload: &[9] }, Cr::Command);
    net.handle_event(Event::FrameReceived { bytes: in_seq }, tick(30));
    let in_seq_again = encode(LinkMode::User, &Frame::I { nr: 0, ns: 2, p: false, m: false, payload: &[9] }, Cr::Command);
    net.handle_event(Event::FrameReceived { bytes: in_seq_again }, tick(40));
    let rej2 = net.poll_tx();
    assert!(rej2.is_some(), "REJ condition must have cleared and be able to fire again");
}

#[test]
fn s5_contention_resolution() {
    let mut net = fresh(LinkMode::Network);
    let sabm1 = encode(
        LinkMode::User,
        &Frame::U { kind: UKind::Sabm, pf: true, payload: &[0xAA, 0xBB, 0xCC] },
        Cr::Command,
    );
    let actions = net.handle_event(Event::FrameReceived { bytes: sabm1 }, tick(0));
    assert!(actions.iter().any(|a| matches!(
        a,
        Action::Indicate(DlIndication::EstablishIndication { payload: Some(p) }) if p.as_slice() == [0xAA, 0xBB, 0xCC]
    )));
    assert_eq!(net.state(), State::MfEst);
    net.poll_tx().expect("first UA");

    let sabm_diff = encode(
        LinkMode::User,
        &Frame::U { kind: UKind::Sabm, pf: true, payload: &[0xAA, 0xBB, 0xCD] },
        Cr::Command,
    );
    let actions = net.handle_event(Event::FrameReceived { bytes: sabm_diff }, tick(10));
    assert!(actions.is_empty());
    assert!(net.poll_tx().is_none());
    assert_eq!(net.state(), State::MfEst);

    let sabm_same = encode(
        LinkMode::User,
        &Frame::U { kind: UKind::Sabm, pf: true, payload: &[0xAA, 0xBB, 0xCC] },
        Cr::Command,
    );
    let actions = net.handle_event(Event::FrameReceived { bytes: sabm_same }, tick(20));
    assert!(!actions.iter().any(|a| matches!(a, Action::Indicate(DlIndication::EstablishIndication { .. }))));
    net.poll_tx().expect("UA re-sent for the duplicate SABM");
}

#[test]
fn s6_normal_release_collision() {
    let mut ms = fresh(LinkMode::User);
    ms.handle_event(Event::Request(DlRequest::Establish { payload: None }), tick(0));
    ms.poll_tx().unwrap();
    let ua = encode(LinkMode::Network, &Frame::U { kind: UKind::Ua, pf: true, payload: &[] }, Cr::Response);
    ms.handle_event(Event::FrameReceived { bytes: ua }, tick(10));
    assert_eq!(ms.state(), State::MfEst);

    let actions = ms.handle_event(Event::Request(DlRequest::Release { mode: lapdm::ReleaseMode::Normal }), tick(20));
    assert!(actions.iter().any(|a| matches!(a, Action::StartTimer { kind: TimerKind::T200 })));
    assert_eq!(ms.state(), State::DiscSent);
    let own_disc = ms.poll_tx().expect("DISC queued");
    let _ = frame::decode(&own_disc, LapdmFormat::B, ControlWidth::Basic).unwrap();

    let peer_disc = encode(LinkMode::Network, &Frame::U { kind: UKind::Disc, pf: true, payload: &[] }, Cr::Command);
    let actions = ms.handle_event(Event::FrameReceived { bytes: peer_disc }, tick(30));
    assert!(find_mdl_error(&actions).is_none());
    assert!(actions.iter().any(|a| matches!(a, Action::Indicate(DlIndication::ReleaseConfirm { cause: ReleaseCause::Normal }))));
    assert_eq!(ms.state(), State::Idle);
    ms.poll_tx().expect("UA sent for the colliding DISC");
}
