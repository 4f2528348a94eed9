pub mod order;
pub mod position;
pub mod quote;
pub mod symbol;
pub mod transaction;
pub mod user;
pub mod wallet;
