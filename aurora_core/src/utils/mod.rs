pub mod interrupt;
pub mod scalar_log;
pub mod telemetry;

pub use interrupt::Interrupt;
pub use scalar_log::ScalarLog;
