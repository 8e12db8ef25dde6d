#![no_std]

// Shared logic for the sensor node.
//
// Everything that decides what the node does lives here: the AT command
// engine, the connection lifecycle, calendar arithmetic and the power
// hand-off. Hardware is reached only through the traits each module exposes,
// so the firmware and the host emulator drive the same code.

pub mod at;
pub mod calendar;
pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod lifecycle;
pub mod modem;
pub mod payload;
pub mod power;
pub mod rx;
pub mod status;
pub mod telemetry;
pub mod time;
