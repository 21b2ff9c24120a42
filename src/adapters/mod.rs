//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements         | Connects to                 |
//! |-------------|--------------------|-----------------------------|
//! | `display`   | PresentationPort   | Panel surface / serial log  |
//! | `nvs`       | ConfigPort         | NVS / in-memory store       |
//! |             | StoragePort        |                             |
//! | `time`      | MicrosClock        | ESP32 high-resolution timer |
//! |             | WallClock          | RTC                         |
//! | `wifi`      | TransportPort      | ESP-IDF WiFi STA + HTTP     |
//! | `device_id` | (helper)           | eFuse MAC                   |

pub mod device_id;
pub mod display;
pub mod nvs;
pub mod time;
pub mod wifi;
