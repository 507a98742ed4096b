//! Forward-only session lifecycle.
//! Sessions move `Open -> Up -> (Down -> Up)* -> Closed`; any step may be skipped,
//! none may be taken backwards, and nothing follows `Closed`.

pub use liveview_protocol::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Unchanged,
    Rejected,
}

pub fn transition(from: SessionStatus, to: SessionStatus) -> Transition {
    use SessionStatus::*;

    match (from, to) {
        (Closed, _) => Transition::Rejected,
        (from, to) if from == to => Transition::Unchanged,
        (_, Open) => Transition::Rejected,
        (Open, Up | Down | Closed) => Transition::Applied,
        (Up, Down | Closed) => Transition::Applied,
        (Down, Up | Closed) => Transition::Applied,
        _ => Transition::Rejected,
    }
}
