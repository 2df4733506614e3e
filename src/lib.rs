/*
 Copyright (c) 2023 clone206

 This file is part of deess

 deess is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 deess is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with deess. If not, see <https://www.gnu.org/licenses/>.
*/

pub mod attenuator;
pub mod color_logger;
pub mod config;
pub mod detector;
pub mod fir_convolve;
pub mod impulse;
pub mod isqrt;
pub mod model;
pub mod pcm;
pub mod pipeline;
pub mod rms;

pub use attenuator::{AttenuationReport, ProgressUpdate};
pub use color_logger::ColorLogger;
pub use config::DeEssConfig;
pub use detector::{Burst, EssDetector};
pub use fir_convolve::OverflowPolicy;
pub use impulse::Profiles;
pub use model::{DeEssError, DeEssResult, Mode, TermResult};
pub use pipeline::{DeEssContext, DetectionReport, write_detection_report};
