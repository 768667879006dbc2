#![allow(dead_code)]
mod callback_probe;

pub use callback_probe::CallbackProbe;
