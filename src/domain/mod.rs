pub mod errors;
pub mod parameters;
pub mod ports;
pub mod position;
pub mod regime;
pub mod trade_result;
pub mod types;
