//! Captive-portal alarm simulator for the Raspberry Pi Pico W.
//!
//! The board brings up a WPA2 soft access point and runs three servers on it: DHCP hands out
//! addresses from a small pool, DNS answers every name with the gateway, and HTTP serves a
//! page that arms and disarms a simulated alarm (blinking red LED, buzzer and an OLED
//! message). A key on the UART console shuts everything down.
//!
//! The protocol handlers, the page and the supervisor are plain Rust and build on the host
//! with the `host` feature; the embassy tasks around them only build for the board.
#![no_std]

pub mod alarm;
pub mod ap_config;
#[cfg(not(feature = "host"))]
pub mod console;
pub mod dhcp_server;
pub mod dns_server;
mod error;
#[cfg(not(feature = "host"))]
pub mod hardware;
pub mod http_server;
#[cfg(not(feature = "host"))]
pub mod oled;
pub mod page;
pub mod service;
pub mod shared_constants;
pub mod supervisor;
pub mod udp_shim;
#[cfg(all(feature = "wifi", not(feature = "host")))]
pub mod wifi_ap;

pub use error::{Error, Result};
