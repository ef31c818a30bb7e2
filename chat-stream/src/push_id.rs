//! Push ids: 20 characters, 8 encoding the write time and 12 of per-millisecond sequence.
//!
//! The alphabet is in ASCII order, so ids sort lexically in creation order. The first id of a
//! millisecond gets a random sequence; later ids in the same millisecond increment it.

use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_CHARS: usize = 8;
const SEQ_CHARS: usize = 12;

#[derive(Debug, Default)]
struct PushIdState {
    last_ts: Option<i64>,
    seq: [u8; SEQ_CHARS],
}

/// Generates insertion-ordered, never-reused record keys.
#[derive(Debug, Default)]
pub struct PushIdGenerator {
    state: Mutex<PushIdState>,
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for a write at `now_ms`. A clock that steps backwards is clamped to the last
    /// timestamp seen, which keeps ids ordered.
    pub fn next(&self, now_ms: i64) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let ts = match state.last_ts {
            Some(last) => now_ms.max(last),
            None => now_ms,
        };

        if state.last_ts == Some(ts) {
            increment(&mut state.seq);
        } else {
            state.seq = random_seq();
        }
        state.last_ts = Some(ts);

        let mut id = String::with_capacity(TIME_CHARS + SEQ_CHARS);
        id.push_str(&encode_time(ts));
        id.extend(state.seq.iter().map(|&digit| PUSH_CHARS[digit as usize] as char));
        id
    }
}

fn encode_time(ts: i64) -> String {
    let mut remaining = ts.max(0) as u64;
    let mut chars = [0u8; TIME_CHARS];
    for slot in chars.iter_mut().rev() {
        *slot = PUSH_CHARS[(remaining % 64) as usize];
        remaining /= 64;
    }
    chars.iter().map(|&c| c as char).collect()
}

fn random_seq() -> [u8; SEQ_CHARS] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut seq = [0u8; SEQ_CHARS];
    for (digit, byte) in seq.iter_mut().zip(bytes.iter()) {
        *digit = byte % 64;
    }
    // Leave headroom so a burst in one millisecond does not carry out of the top digit.
    seq[0] %= 32;
    seq
}

fn increment(seq: &mut [u8; SEQ_CHARS]) {
    for digit in seq.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return;
        }
    }
}
