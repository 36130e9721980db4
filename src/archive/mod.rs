//! Archive handling utilities.
//!
//! Qt SDK archives are 7z files; extraction shells out to a 7z executable.

pub mod sevenzip;

pub use sevenzip::{extract_all, resolve_program, DEFAULT_7Z};
