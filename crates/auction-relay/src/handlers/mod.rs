pub mod auction;
pub mod vault_quote;
