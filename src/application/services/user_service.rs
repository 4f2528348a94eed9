use crate::domain::entities::user::{validate_username, User};
use crate::domain::entities::wallet::Wallet;
use crate::domain::errors::TradingError;
use crate::persistence::repository::UserRepository;
use crate::persistence::DatabaseError;
use tracing::info;

pub struct UserService {
    users: UserRepository,
    initial_balance: f64,
}

impl UserService {
    pub fn new(users: UserRepository, initial_balance: f64) -> Self {
        Self {
            users,
            initial_balance,
        }
    }

    /// Create a user together with a funded wallet
    pub async fn register(&self, raw_username: &str) -> Result<(User, Wallet), TradingError> {
        let username = validate_username(raw_username)?;

        let (user, wallet) = self
            .users
            .create_with_wallet(&username, self.initial_balance)
            .await
            .map_err(|e| match e {
                DatabaseError::UniqueViolation(_) => TradingError::DuplicateUser(username.clone()),
                other => other.into(),
            })?;

        info!(
            "Registered user {} ({}) with {:.2} cash",
            user.id, user.username, wallet.cash_balance
        );
        Ok((user.into(), wallet.into()))
    }

    pub async fn get(&self, user_id: i64) -> Result<User, TradingError> {
        self.users
            .get(user_id)
            .await?
            .map(User::from)
            .ok_or(TradingError::UserNotFound(user_id))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, TradingError> {
        Ok(self
            .users
            .find_by_username(username.trim())
            .await?
            .map(User::from))
    }
}
