pub mod asset;
pub mod balance;
pub mod logs;
pub mod owner;
pub mod price;
pub mod rate;
