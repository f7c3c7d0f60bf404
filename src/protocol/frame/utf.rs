//! Incremental UTF-8 validation for text messages split across frames and reads.

/// Validates a text message as its bytes arrive.
///
/// A code point may straddle any number of frame or read boundaries; only
/// [`Utf8Checker::finish`] decides whether a dangling partial sequence is an error.
#[derive(Debug, Default)]
pub(crate) struct Utf8Checker {
    incomplete: Option<utf8::Incomplete>,
}

impl Utf8Checker {
    /// Forget any partial code point and start a new message.
    pub(crate) fn reset(&mut self) {
        self.incomplete = None;
    }

    /// Feed the next chunk. Returns `false` as soon as the bytes cannot be UTF-8.
    pub(crate) fn write(&mut self, mut input: &[u8]) -> bool {
        if let Some(mut incomplete) = self.incomplete.take() {
            match incomplete.try_complete(input) {
                Some((Ok(_), rest)) => input = rest,
                Some((Err(_), _)) => return false,
                None => {
                    self.incomplete = Some(incomplete);
                    return true;
                }
            }
        }

        if input.is_empty() {
            return true;
        }

        match utf8::decode(input) {
            Ok(_) => true,
            Err(utf8::DecodeError::Incomplete { incomplete_suffix, .. }) => {
                self.incomplete = Some(incomplete_suffix);
                true
            }
            Err(utf8::DecodeError::Invalid { .. }) => false,
        }
    }

    /// The message is complete. Returns `false` if it ended inside a code point.
    pub(crate) fn finish(&mut self) -> bool {
        self.incomplete.take().is_none()
    }
}
