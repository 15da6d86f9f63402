//! Status Signals: the boolean confirmations exchanged after every phase and
//! round.
//!
//! A signal travels in its own [`STATUS_SLOT`]-byte slot as the ASCII text
//! `"1"` (success) or `"0"` (failure), zero padded.  On receipt the slot is
//! read as a leading decimal integer; only the value `1` means success, so an
//! empty, garbled or unexpected slot is indistinguishable from failure.

/// Size of a status slot on the wire.
pub const STATUS_SLOT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Textual form placed at the start of the slot.
    pub fn encode(self) -> &'static [u8] {
        match self {
            Self::Success => b"1",
            Self::Failure => b"0",
        }
    }

    /// Interpret a received slot.
    pub fn parse(slot: &[u8]) -> Self {
        let text = slot
            .iter()
            .position(|&b| b == 0)
            .map_or(slot, |end| &slot[..end]);
        let text = std::str::from_utf8(text).unwrap_or_default().trim_start();

        let digits_end = text
            .char_indices()
            .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '+' || c == '-'))))
            .map_or(text.len(), |(i, _)| i);

        match text[..digits_end].parse::<i64>() {
            Ok(1) => Self::Success,
            _ => Self::Failure,
        }
    }
}
