//! Typesetting for songbooks.
//!
//! A [`Compiler`] runs an [`Engine`] (normally a [`LatexEngine`] found on
//! `PATH`) over a complete LaTeX source and hands back the PDF, its page count
//! and the final engine log. With the `mock` feature, [`MockEngine`] stands in
//! for LaTeX in tests.

mod compiler;
pub mod diagnostics;
mod engine;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;

pub use crate::compiler::{CompiledDocument, Compiler, CompilerOptions};
pub use crate::engine::{Engine, EngineHandle, EngineRun, LatexEngine};
#[cfg(feature = "mock")]
pub use crate::mock::MockEngine;
