#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The bus rejected or aborted a write transfer.
    WriteFailure,
    /// The bus rejected or aborted a read transfer.
    ReadFailure,
    /// The data-ready line never asserted within the configured window.
    Timeout,
    /// A response led with a report ID other than the one expected.
    UnexpectedReply,
    /// A received packet was too short for the layout being decoded.
    InvalidPacket,
    /// The device reported a failure status for a command or FRS transfer.
    CommandFailed,
    /// Caller passed an out-of-range channel or oversized payload.
    InvalidArg,
}
