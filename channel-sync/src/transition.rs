//! Transition planning: cached state × observed category → steps to apply
//!
//! | cached \ observed | opening | opened  | closing        | closed                 |
//! |-------------------|---------|---------|----------------|------------------------|
//! | not synced        | Opening | skip    | skip           | skip                   |
//! | Opening           | refresh | Opened  | skip           | skip                   |
//! | Opened / Updating | ✗       | refresh | Closing        | skip                   |
//! | Closing           | ✗       | ✗       | refresh        | Closed                 |
//! | Closed            | ✗       | ✗       | ✗              | refresh                |
//!
//! "skip" synthesizes every intermediate phase; ✗ is an impossible transition.

use channel_core::ChannelStateName;
use std::fmt;

/// Where a channel was found during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Pending-open list
    PendingOpen,
    /// Open list
    Open,
    /// Waiting-close list
    WaitingClose,
    /// Pending cooperative close list
    PendingClosing,
    /// Pending force close list
    ForceClosing,
    /// Closed list
    Closed,
    /// Cached but absent from every list
    Vanished,
}

impl Category {
    /// Lifecycle state the observation implies
    pub fn target(&self) -> ChannelStateName {
        match self {
            Category::PendingOpen => ChannelStateName::Opening,
            Category::Open | Category::WaitingClose => ChannelStateName::Opened,
            Category::PendingClosing | Category::ForceClosing => ChannelStateName::Closing,
            Category::Closed | Category::Vanished => ChannelStateName::Closed,
        }
    }

    /// Log label
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PendingOpen => "pending_open",
            Category::Open => "open",
            Category::WaitingClose => "waiting_close",
            Category::PendingClosing => "pending_closing",
            Category::ForceClosing => "force_closing",
            Category::Closed => "closed",
            Category::Vanished => "vanished",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with one observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Same phase: refresh mutable fields, no event
    Refresh,
    /// Apply these states in order; all but the last are synthesized
    Advance(Vec<ChannelStateName>),
}

impl Plan {
    /// More than one step means phases were skipped
    pub fn is_skip(&self) -> bool {
        matches!(self, Plan::Advance(steps) if steps.len() > 1)
    }
}

/// Observation implies moving backwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpossibleTransition {
    /// Cached state
    pub from: ChannelStateName,
    /// Observed state
    pub to: ChannelStateName,
}

impl fmt::Display for ImpossibleTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

const FORWARD: [ChannelStateName; 4] = [
    ChannelStateName::Opening,
    ChannelStateName::Opened,
    ChannelStateName::Closing,
    ChannelStateName::Closed,
];

/// Plan the move from the cached state (`None` = never synced) to `target`
pub fn plan(
    cached: Option<ChannelStateName>,
    target: ChannelStateName,
) -> Result<Plan, ImpossibleTransition> {
    let to = usize::from(target.phase());

    let Some(from) = cached else {
        return Ok(Plan::Advance(FORWARD[..=to].to_vec()));
    };

    if target.phase() < from.phase() {
        return Err(ImpossibleTransition { from, to: target });
    }
    if target.phase() == from.phase() {
        return Ok(Plan::Refresh);
    }

    let mut steps = Vec::with_capacity(4);
    if from == ChannelStateName::Updating {
        // Finish the update before leaving the Opened phase.
        steps.push(ChannelStateName::Opened);
    }
    steps.extend_from_slice(&FORWARD[usize::from(from.phase()) + 1..=to]);
    Ok(Plan::Advance(steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChannelStateName::*;

    #[test]
    fn test_first_sight_synthesizes_history() {
        assert_eq!(plan(None, Opening), Ok(Plan::Advance(vec![Opening])));
        assert_eq!(plan(None, Opened), Ok(Plan::Advance(vec![Opening, Opened])));
        assert_eq!(
            plan(None, Closed),
            Ok(Plan::Advance(vec![Opening, Opened, Closing, Closed]))
        );
    }

    #[test]
    fn test_adjacent_steps() {
        assert_eq!(plan(Some(Opening), Opened), Ok(Plan::Advance(vec![Opened])));
        assert_eq!(plan(Some(Opened), Closing), Ok(Plan::Advance(vec![Closing])));
        assert_eq!(plan(Some(Closing), Closed), Ok(Plan::Advance(vec![Closed])));
        assert!(!plan(Some(Closing), Closed).unwrap().is_skip());
    }

    #[test]
    fn test_skips() {
        let skip = plan(Some(Opening), Closed).unwrap();
        assert_eq!(skip, Plan::Advance(vec![Opened, Closing, Closed]));
        assert!(skip.is_skip());
        assert_eq!(plan(Some(Opened), Closed), Ok(Plan::Advance(vec![Closing, Closed])));
    }

    #[test]
    fn test_same_phase_refreshes() {
        for state in [Opening, Opened, Closing, Closed] {
            assert_eq!(plan(Some(state), state), Ok(Plan::Refresh));
        }
        assert_eq!(plan(Some(Updating), Opened), Ok(Plan::Refresh));
    }

    #[test]
    fn test_updating_completes_before_closing() {
        assert_eq!(
            plan(Some(Updating), Closing),
            Ok(Plan::Advance(vec![Opened, Closing]))
        );
    }

    #[test]
    fn test_backwards_is_impossible() {
        assert_eq!(
            plan(Some(Closed), Opening),
            Err(ImpossibleTransition { from: Closed, to: Opening })
        );
        assert!(plan(Some(Opened), Opening).is_err());
        assert!(plan(Some(Closing), Opened).is_err());
        assert!(plan(Some(Closed), Closing).is_err());
    }

    #[test]
    fn test_category_targets() {
        assert_eq!(Category::WaitingClose.target(), Opened);
        assert_eq!(Category::ForceClosing.target(), Closing);
        assert_eq!(Category::Vanished.target(), Closed);
    }
}
