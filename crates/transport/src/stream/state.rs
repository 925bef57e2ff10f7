/// Lifecycle of one logical message stream, tracked independently for the
/// send and receive directions.
///
/// ```text
/// Idle -> Init -> Open -> HalfClosed -> Closed
/// ```
///
/// `Init` means the start line has been exchanged but not the header block;
/// `HalfClosed` means the body has ended but a declared trailer is still
/// outstanding. Transitions only ever move forward; an attempt to move
/// backwards is a state error, never a panic.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    /// Nothing exchanged yet
    Idle,
    /// Start line seen or sent, header block pending
    Init,
    /// Header block exchanged, body in progress
    Open,
    /// Body finished, declared trailer outstanding
    HalfClosed,
    /// Direction fully terminated
    Closed,
}

impl StreamState {
    /// Returns true once the direction cannot carry any further frames.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed)
    }
}
