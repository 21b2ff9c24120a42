//! Chip-level drivers: restart, task placement, watchdog.

pub mod system;
pub mod task_pin;
pub mod watchdog;
