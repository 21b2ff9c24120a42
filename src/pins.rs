//! GPIO assignments for the EnvSense board.
//!
//! Single source of truth: `main` takes pins through these constants rather
//! than hard-coding numbers.

// ---------------------------------------------------------------------------
// DHT11 temperature / humidity sensor
// ---------------------------------------------------------------------------

/// Single-wire data line.  Open-drain with the internal pull-up enabled;
/// boards with long leads should add an external 4.7 kΩ–10 kΩ pull-up.
pub const DHT11_DATA_GPIO: i32 = 22;
