use crate::application::services::trading_service::{conflict_backoff, MAX_SETTLEMENT_RETRIES};
use crate::application::services::user_locks::UserLocks;
use crate::domain::entities::wallet::{MovementKind, Wallet, WalletMovement};
use crate::domain::errors::TradingError;
use crate::domain::value_objects::money::Amount;
use crate::persistence::ledger::TradeLedger;
use crate::persistence::repository::WalletRepository;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_MOVEMENT_LIMIT: i64 = 50;

pub struct WalletService {
    wallets: WalletRepository,
    ledger: TradeLedger,
    locks: Arc<UserLocks>,
}

impl WalletService {
    pub fn new(wallets: WalletRepository, ledger: TradeLedger, locks: Arc<UserLocks>) -> Self {
        Self {
            wallets,
            ledger,
            locks,
        }
    }

    pub async fn get(&self, user_id: i64) -> Result<Wallet, TradingError> {
        self.wallets
            .get(user_id)
            .await?
            .map(Wallet::from)
            .ok_or(TradingError::UserNotFound(user_id))
    }

    pub async fn deposit(&self, user_id: i64, amount: f64) -> Result<(Wallet, WalletMovement), TradingError> {
        self.move_cash(user_id, MovementKind::Deposit, amount).await
    }

    /// Fails with `InsufficientFunds` when `amount` exceeds the balance
    pub async fn withdraw(&self, user_id: i64, amount: f64) -> Result<(Wallet, WalletMovement), TradingError> {
        self.move_cash(user_id, MovementKind::Withdrawal, amount).await
    }

    /// Most recent deposits and withdrawals first
    pub async fn movements(&self, user_id: i64, limit: Option<i64>) -> Result<Vec<WalletMovement>, TradingError> {
        self.get(user_id).await?;
        let limit = limit.unwrap_or(DEFAULT_MOVEMENT_LIMIT).clamp(1, 1000);
        self.wallets
            .movements(user_id, limit)
            .await?
            .into_iter()
            .map(|record| WalletMovement::try_from(record).map_err(TradingError::from))
            .collect()
    }

    async fn move_cash(
        &self,
        user_id: i64,
        kind: MovementKind,
        amount: f64,
    ) -> Result<(Wallet, WalletMovement), TradingError> {
        let amount = Amount::new(amount)?;
        let _guard = self.locks.lock(user_id).await;
        let mut retries = 0;
        let (wallet, movement) = loop {
            match self.ledger.record_cash_movement(user_id, kind, amount).await {
                Err(TradingError::ConcurrentModification(_)) if retries < MAX_SETTLEMENT_RETRIES => {
                    retries += 1;
                    warn!(
                        "{} conflict for user {}, retry {}/{}",
                        kind.as_str(),
                        user_id,
                        retries,
                        MAX_SETTLEMENT_RETRIES
                    );
                    tokio::time::sleep(conflict_backoff(retries)).await;
                }
                other => break other?,
            }
        };
        info!(
            "{} of {:.2} for user {}, balance {:.2}",
            kind.as_str(),
            amount.value(),
            user_id,
            wallet.cash_balance
        );
        Ok((wallet, movement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_memory_database;
    use crate::persistence::repository::UserRepository;

    async fn setup() -> (WalletService, i64) {
        let pool = init_memory_database().await.unwrap();
        let (user, _) = UserRepository::new(pool.clone())
            .create_with_wallet("saver", 1_000.0)
            .await
            .unwrap();
        let service = WalletService::new(
            WalletRepository::new(pool.clone()),
            TradeLedger::new(pool),
            Arc::new(UserLocks::new()),
        );
        (service, user.id)
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let (wallets, user_id) = setup().await;

        let (wallet, _) = wallets.deposit(user_id, 250.5).await.unwrap();
        assert_eq!(wallet.cash_balance, 1_250.5);

        let (wallet, movement) = wallets.withdraw(user_id, 50.5).await.unwrap();
        assert_eq!(wallet.cash_balance, 1_200.0);
        assert_eq!(movement.kind, MovementKind::Withdrawal);

        let history = wallets.movements(user_id, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, MovementKind::Withdrawal);
    }

    #[tokio::test]
    async fn test_overdraft_rejected() {
        let (wallets, user_id) = setup().await;
        let err = wallets.withdraw(user_id, 1_000.01).await.unwrap_err();
        assert!(matches!(err, TradingError::InsufficientFunds { .. }));
        assert_eq!(wallets.get(user_id).await.unwrap().cash_balance, 1_000.0);
    }

    #[tokio::test]
    async fn test_non_positive_amounts_rejected() {
        let (wallets, user_id) = setup().await;
        assert!(matches!(
            wallets.deposit(user_id, 0.0).await,
            Err(TradingError::InvalidInput(_))
        ));
        assert!(matches!(
            wallets.withdraw(user_id, -5.0).await,
            Err(TradingError::InvalidInput(_))
        ));
        assert!(matches!(
            wallets.deposit(user_id, f64::NAN).await,
            Err(TradingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (wallets, _) = setup().await;
        assert_eq!(
            wallets.deposit(77, 10.0).await.unwrap_err(),
            TradingError::UserNotFound(77)
        );
        assert_eq!(
            wallets.movements(77, None).await.unwrap_err(),
            TradingError::UserNotFound(77)
        );
    }
}
