// Risk management module
pub mod balance_floor;

pub use balance_floor::BalanceFloor;
