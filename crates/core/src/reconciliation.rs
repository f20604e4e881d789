//! Payment reconciliation rules.
//!
//! `pending` moves to `paid` or `failed` exactly once; both are absorbing.
//! Only the callback that performs the transition triggers follow-ups, so
//! duplicate deliveries neither re-notify the customer nor re-close sessions.

use serde::{Deserialize, Serialize};

use crate::domain::order::PaymentStatus;
use crate::payment::PaymentOutcome;

/// Result of applying a callback to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "status")]
pub enum Settlement {
    /// This callback moved the pair out of `pending`.
    Applied(PaymentStatus),
    /// The pair was already terminal; nothing changed.
    AlreadySettled(PaymentStatus),
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserNotice {
    PaymentConfirmed,
    PaymentFailed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FollowUp {
    pub notice: Option<UserNotice>,
    pub close_session: bool,
}

/// Terminal status a gateway outcome drives towards, if any. A cardholder
/// cancellation leaves the order pending so a new link can still be used.
pub fn target_status(outcome: PaymentOutcome) -> Option<PaymentStatus> {
    match outcome {
        PaymentOutcome::Succeeded => Some(PaymentStatus::Paid),
        PaymentOutcome::Failed => Some(PaymentStatus::Failed),
        PaymentOutcome::CancelledByUser => None,
    }
}

impl Settlement {
    pub fn follow_up(&self) -> FollowUp {
        match self {
            Self::Applied(PaymentStatus::Paid) => {
                FollowUp { notice: Some(UserNotice::PaymentConfirmed), close_session: true }
            }
            Self::Applied(PaymentStatus::Failed) => {
                FollowUp { notice: Some(UserNotice::PaymentFailed), close_session: false }
            }
            Self::Applied(PaymentStatus::Pending) | Self::AlreadySettled(_) | Self::NotFound => {
                FollowUp::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{target_status, FollowUp, Settlement, UserNotice};
    use crate::domain::order::PaymentStatus;
    use crate::payment::PaymentOutcome;

    #[test]
    fn applied_success_notifies_and_closes() {
        assert_eq!(
            Settlement::Applied(PaymentStatus::Paid).follow_up(),
            FollowUp { notice: Some(UserNotice::PaymentConfirmed), close_session: true }
        );
    }

    #[test]
    fn applied_failure_notifies_but_keeps_session_open() {
        assert_eq!(
            Settlement::Applied(PaymentStatus::Failed).follow_up(),
            FollowUp { notice: Some(UserNotice::PaymentFailed), close_session: false }
        );
    }

    #[test]
    fn repeated_callbacks_have_no_follow_up() {
        for current in [PaymentStatus::Paid, PaymentStatus::Failed] {
            assert_eq!(Settlement::AlreadySettled(current).follow_up(), FollowUp::default());
        }
    }

    #[test]
    fn missing_order_has_no_follow_up() {
        assert_eq!(Settlement::NotFound.follow_up(), FollowUp::default());
    }

    #[test]
    fn cancellation_has_no_target_status() {
        assert_eq!(target_status(PaymentOutcome::Succeeded), Some(PaymentStatus::Paid));
        assert_eq!(target_status(PaymentOutcome::Failed), Some(PaymentStatus::Failed));
        assert_eq!(target_status(PaymentOutcome::CancelledByUser), None);
    }
}
