//! Test doubles for the process seam
//!
//! [`ScriptedRunner`] stands in for yt-dlp: it answers title lookups from a
//! canned value and replays queued [`RunScript`]s for downloads, writing the
//! scripted output into real pipes in small chunks so line splitting is
//! exercised at arbitrary byte boundaries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tubevault::testing::{RunScript, ScriptedRunner};
//!
//! let runner = Arc::new(ScriptedRunner::new().with_title("My Video!!"));
//! runner.push_download(RunScript::success(1024).with_stdout("PROGRESS:  50.0% of 1.00KiB\r"));
//! // hand `runner` to DownloadService::new(...)
//! ```
//!
//! Scripts can also be kept as JSON under `tests/scripts/` and loaded with
//! [`RunScript::load_by_name`].

pub mod runner;
pub mod script;

pub use runner::{ScriptedRunner, TitleResponse};
pub use script::RunScript;
