//! Driven adapters: hardware and platform bindings behind the port traits.

pub mod device_id;
pub mod nvs;
pub mod time;
pub mod wifi;
