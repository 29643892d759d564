//! Audio device backends for beatclock.
//!
//! Each backend owns a render loop that advances the shared sample clock
//! and releases scheduled MIDI at the right frame of each block.

mod cpal_backend;
mod offline;
mod render;
mod traits;

pub use cpal_backend::CpalOutput;
pub use offline::OfflineDevice;
pub use render::{MidiCallback, MidiRenderer};
pub use traits::{AudioDevice, AudioError};
