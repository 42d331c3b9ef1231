mod log_durability;

pub use log_durability::*;
