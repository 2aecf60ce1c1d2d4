//! Directive-driven output checking for `.lir` regression tests.
//!
//! Test files embed their expectations as `;` comments:
//!
//! ```text
//! ; RUN: lir-check %s
//! entity @top () () {
//! }
//! ; CHECK: top: ok
//! ```
//!
//! [`directive::parse`] extracts the markers from a test file and
//! [`check::check_lines`] matches the collected expectations against the
//! output of the command named by the `RUN:` line. This crate is pure
//! text processing; running the command and wiring the two together is
//! the harness's job.

pub mod check;
pub mod directive;

pub use check::{check_lines, normalize, CheckFailure};
pub use directive::{parse, CheckKind, CheckLine, Directives};
