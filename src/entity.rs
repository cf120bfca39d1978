//! Multiplex/Entity (spec.md §4.5): one [`Entity`] owns every [`Datalink`] sharing a physical
//! channel, dispatches received PHY frames to the right one by SAPI, and round-robins the single
//! PHY write slot across datalinks with pending tx-queues.

use crate::config::{ChannelKind, DatalinkConfig};
use crate::datalink::Datalink;
use crate::frame::Sapi;
use crate::primitives::{Action, Event};
use alloc::vec::Vec;
use embedded_time::{Clock, Instant};

/// Owns one [`Datalink`] per [`Sapi`] this channel carries, indexed by [`Sapi::index`].
pub struct Entity<C: Clock> {
    datalinks: [Datalink<C>; 2],
    /// Index into `datalinks` of the SAPI served last, for round-robin fairness.
    last_served: usize,
    /// Whether a PHY write is currently in flight; while set, newly queued frames wait.
    write_pending: bool,
    /// Set by [`Entity::configure`]; needed to know how many header octets precede the address
    /// octet when peeking a received frame's SAPI.
    channel: Option<ChannelKind>,
}

impl<C: Clock> Entity<C> {
    pub fn new(normal: DatalinkConfig, sms: DatalinkConfig) -> Self {
        Entity {
            datalinks: [Datalink::new(Sapi::Normal, normal), Datalink::new(Sapi::Sms, sms)],
            last_served: 0,
            write_pending: false,
            channel: None,
        }
    }

    pub fn datalink(&self, sapi: Sapi) -> &Datalink<C> {
        &self.datalinks[sapi.index()]
    }

    pub fn datalink_mut(&mut self, sapi: Sapi) -> &mut Datalink<C> {
        &mut self.datalinks[sapi.index()]
    }

    /// Configures every owned datalink for `channel` (one-time setup before traffic starts).
    pub fn configure(&mut self, channel: ChannelKind, now: Instant<C>) {
        self.channel = Some(channel);
        for dl in self.datalinks.iter_mut() {
            dl.handle_event(Event::Configure { channel }, now);
        }
    }

    /// Routes a DL-SAP request or T200/T203 expiry to the named SAPI's datalink, and
    /// opportunistically drains a frame onto the PHY if the write slot is free. The second element
    /// of the returned pair is that frame, if any; the caller is responsible for writing it and
    /// later calling [`Entity::write_complete`].
    pub fn handle_event(&mut self, sapi: Sapi, event: Event, now: Instant<C>) -> (Vec<Action>, Option<Vec<u8>>) {
        let actions = self.datalinks[sapi.index()].handle_event(event, now);
        (actions, self.fill_write_slot())
    }

    /// Dispatches a received on-air frame by its address-octet SAPI. Frames for a SAPI this
    /// entity does not carry are silently dropped (spec.md §4.5).
    pub fn receive(&mut self, bytes: Vec<u8>, now: Instant<C>) -> (Vec<Action>, Option<Vec<u8>>) {
        let sapi = match peek_sapi(&bytes, self.channel) {
            Some(sapi) => sapi,
            None => return (Vec::new(), self.fill_write_slot()),
        };
        let actions = self.datalinks[sapi.index()].handle_event(Event::FrameReceived { bytes }, now);
        (actions, self.fill_write_slot())
    }

    /// Called once the previously dispatched PHY write has completed. Frees the write slot and, if
    /// any datalink has a frame queued, returns the next one to write (round-robin).
    pub fn write_complete(&mut self) -> Option<Vec<u8>> {
        self.write_pending = false;
        self.fill_write_slot()
    }

    fn fill_write_slot(&mut self) -> Option<Vec<u8>> {
        if self.write_pending {
            return None;
        }
        for offset in 1..=self.datalinks.len() {
            let idx = (self.last_served + offset) % self.datalinks.len();
            if let Some(bytes) = self.datalinks[idx].poll_tx() {
                self.last_served = idx;
                self.write_pending = true;
                return Some(bytes);
            }
        }
        None
    }
}

/// Peeks the SAPI out of the address octet without fully decoding the frame. `channel` is needed
/// to skip the 2-octet L1 header on SACCH (format B4); BCCH (format Bbis) carries no address
/// octet at all and is always [`Sapi::Normal`]. Before `channel` is known, assumes no header.
/// Returns `None` for an unrecognized SAPI bit pattern, same as a header too short to peek at —
/// both drop the frame silently (spec.md §4.5) rather than guess a datalink to route it to.
fn peek_sapi(bytes: &[u8], channel: Option<ChannelKind>) -> Option<Sapi> {
    if channel == Some(ChannelKind::Bcch) {
        return Some(Sapi::Normal);
    }
    let header_len = if channel == Some(ChannelKind::Sacch) { 2 } else { 0 };
    let raw = (*bytes.get(header_len)? >> 2) & 0x7;
    Sapi::from_raw(raw)
}
