pub mod coordinator;
pub mod tally;
pub mod transport;

pub use coordinator::{
    ApprovalCoordinator, ApprovalDecision, ApprovalRequest, ResolveOutcome, REASON_CANCELLED,
    REASON_NO_TRANSPORT, REASON_SESSION_CLOSED,
};
pub use tally::{ApprovalStatus, TallySnapshot, VoteTally};
pub use transport::{ApprovalNotice, ApprovalTransport, ChannelTransport, TransportError};
