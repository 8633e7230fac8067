/// Reasons a microphone request was turned down. All of them are transient:
/// the caller retries later, typically on a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MicError {
    /// Honouring the request needs a reconfiguration and an active user is
    /// non-interruptible.
    NonInterruptibleUser,
    /// Every splitter stream is already taken.
    TooManyUsers,
    /// No concurrency chain is configured and another user holds the mics.
    ConcurrencyDisabled,
}
