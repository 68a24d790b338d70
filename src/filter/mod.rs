//! Digital filter design and zero-phase application for EMG conditioning.

pub mod apply;
pub mod design;

pub use apply::filtfilt;
pub use design::{butter_bandpass, clamp_lowpass, design_notch};
