//! Accounts Gateway (spec.md §4.5): a narrow external-collaborator contract.
//! The real implementation (credits, billing) lives outside this crate; we
//! depend only on this trait, plus an in-memory stand-in for tests and for
//! running the scheduler without a billing backend wired up.

use async_trait::async_trait;
use dashmap::DashMap;
use orchestrator_types::{AccountId, ReservationId, SchedulerError};

#[async_trait]
pub trait AccountsGateway: Send + Sync {
    async fn reserve(&self, account_id: AccountId, cents: u64, currency: &str) -> Result<ReservationId, SchedulerError>;
    async fn debit(&self, reservation_id: ReservationId, actual_cents: u64) -> Result<u64, SchedulerError>;
    async fn refund(&self, reservation_id: ReservationId) -> Result<(), SchedulerError>;
}

struct Reservation {
    account_id: AccountId,
    cents: u64,
}

/// In-memory accounts gateway: every account starts with an effectively
/// unlimited balance unless `with_balance` caps it. Good enough to exercise
/// the scheduler's reserve/debit/refund invariant without a real billing
/// service.
pub struct InMemoryAccountsGateway {
    balances: DashMap<AccountId, u64>,
    reservations: DashMap<ReservationId, Reservation>,
    unlimited: bool,
}

impl InMemoryAccountsGateway {
    pub fn unlimited() -> Self {
        Self { balances: DashMap::new(), reservations: DashMap::new(), unlimited: true }
    }

    pub fn with_balance(account_id: AccountId, cents: u64) -> Self {
        let balances = DashMap::new();
        balances.insert(account_id, cents);
        Self { balances, reservations: DashMap::new(), unlimited: false }
    }

    pub fn balance(&self, account_id: AccountId) -> u64 {
        self.balances.get(&account_id).map(|b| *b).unwrap_or(0)
    }
}

#[async_trait]
impl AccountsGateway for InMemoryAccountsGateway {
    async fn reserve(&self, account_id: AccountId, cents: u64, _currency: &str) -> Result<ReservationId, SchedulerError> {
        if !self.unlimited {
            let mut balance = self.balances.entry(account_id).or_insert(0);
            if *balance < cents {
                return Err(SchedulerError::InsufficientFunds);
            }
            *balance -= cents;
        }
        let reservation_id = ReservationId::new();
        self.reservations.insert(reservation_id, Reservation { account_id, cents });
        Ok(reservation_id)
    }

    async fn debit(&self, reservation_id: ReservationId, actual_cents: u64) -> Result<u64, SchedulerError> {
        let (_, reservation) = self
            .reservations
            .remove(&reservation_id)
            .ok_or_else(|| SchedulerError::AccountsError("unknown reservation".into()))?;

        let debited = actual_cents.min(reservation.cents);
        let refund_amount = reservation.cents - debited;
        if !self.unlimited && refund_amount > 0 {
            *self.balances.entry(reservation.account_id).or_insert(0) += refund_amount;
        }
        if actual_cents > reservation.cents {
            tracing::warn!(
                reservation = %reservation_id,
                reserved = reservation.cents,
                actual = actual_cents,
                "actual cost exceeded reservation; capped debit at reserved amount"
            );
        }
        Ok(self.balance(reservation.account_id))
    }

    async fn refund(&self, reservation_id: ReservationId) -> Result<(), SchedulerError> {
        if let Some((_, reservation)) = self.reservations.remove(&reservation_id) {
            if !self.unlimited {
                *self.balances.entry(reservation.account_id).or_insert(0) += reservation.cents;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_then_debit_leaves_remaining_balance() {
        let account = AccountId::new();
        let gateway = InMemoryAccountsGateway::with_balance(account, 1000);
        let reservation = gateway.reserve(account, 400, "usd").await.unwrap();
        assert_eq!(gateway.balance(account), 600);
        let remaining = gateway.debit(reservation, 250).await.unwrap();
        assert_eq!(remaining, 750);
    }

    #[tokio::test]
    async fn over_debit_caps_at_reserved_amount() {
        let account = AccountId::new();
        let gateway = InMemoryAccountsGateway::with_balance(account, 1000);
        let reservation = gateway.reserve(account, 400, "usd").await.unwrap();
        let remaining = gateway.debit(reservation, 900).await.unwrap();
        assert_eq!(remaining, 600);
    }

    #[tokio::test]
    async fn refund_restores_balance() {
        let account = AccountId::new();
        let gateway = InMemoryAccountsGateway::with_balance(account, 1000);
        let reservation = gateway.reserve(account, 400, "usd").await.unwrap();
        gateway.refund(reservation).await.unwrap();
        assert_eq!(gateway.balance(account), 1000);
    }

    #[tokio::test]
    async fn insufficient_funds_rejects_reservation() {
        let account = AccountId::new();
        let gateway = InMemoryAccountsGateway::with_balance(account, 100);
        let err = gateway.reserve(account, 400, "usd").await.unwrap_err();
        assert!(matches!(err, SchedulerError::InsufficientFunds));
    }
}
