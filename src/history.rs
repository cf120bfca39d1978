//! Tx-history: a fixed ring of at most `range_hist` outgoing I/U frames, indexed by sequence
//! number modulo `range_hist` (spec.md §3, §9 "Arena+index for tx-history").
//!
//! The original C core allocates this as a `talloc`-owned array tied to the process-wide
//! allocation context; here it is simply a `Vec<Option<Entry>>` owned directly by the
//! [`crate::datalink::Datalink`], dropped with it.

use alloc::vec;
use alloc::vec::Vec;

/// One retained outgoing I-frame: enough to rebuild it verbatim (modulo N(R)/P, which change on
/// every retransmission) rather than the fully encoded bytes, since re-emitting after a REJ needs
/// the current V(R) and P=0 spliced back in.
#[derive(Debug, Clone)]
pub struct Entry {
    pub ns: u8,
    pub more: bool,
    pub payload: Vec<u8>,
}

/// Fixed-capacity ring indexed by `seq % capacity`. `capacity` is always a power of two
/// (`range_hist`, per [`crate::config::DatalinkConfig::range_hist`]).
#[derive(Debug, Clone)]
pub struct TxHistory {
    slots: Vec<Option<Entry>>,
}

impl TxHistory {
    pub fn new(capacity: usize) -> Self {
        TxHistory {
            slots: vec![None; capacity],
        }
    }

    fn index(&self, seq: u8) -> usize {
        (seq as usize) % self.slots.len()
    }

    pub fn get(&self, seq: u8) -> Option<&Entry> {
        self.slots[self.index(seq)].as_ref()
    }

    pub fn insert(&mut self, seq: u8, entry: Entry) {
        let idx = self.index(seq);
        self.slots[idx] = Some(entry);
    }

    pub fn release(&mut self, seq: u8) {
        let idx = self.index(seq);
        self.slots[idx] = None;
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_at_capacity() {
        let mut h = TxHistory::new(4);
        h.insert(0, Entry { ns: 0, more: false, payload: vec![1] });
        h.insert(4, Entry { ns: 4, more: false, payload: vec![2] });
        assert_eq!(h.get(0).unwrap().payload, vec![2]);
        h.release(4);
        assert!(h.get(0).is_none());
    }
}
