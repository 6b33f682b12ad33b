//! structmeta: structural metadata of digitized objects.
//!
//! A workpiece holds a logical tree (chapters, volumes, articles) and a
//! physical tree (pages and their media files). Logical divisions view
//! physical ones; the editor keeps both sides of that relation in step.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
