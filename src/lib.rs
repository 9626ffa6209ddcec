//! # LoveJS
//!
//! A LÖVE-style 2D game runtime: JavaScript callbacks (`load`, `update`,
//! `draw`, input handlers) driven by a native frame loop, on top of QuickJS.
//!
//! ## Features
//!
//! - **Strict value conversion**: integers, floats, booleans, strings and arrays
//!   cross the boundary without silent coercion
//! - **Native functions**: any closure of up to eight arguments becomes a
//!   script function with exact arity checking
//! - **Namespaces as modules**: registered namespaces are globals and
//!   importable ES modules at the same time
//! - **Bytecode**: scripts compile to QuickJS bytecode, which can be embedded
//!   into the `lovejs` executable itself
//!
//! ### Example
//!
//! ```ignore
//! use lovejs::scripting::Engine;
//!
//! let mut engine = Engine::default();
//! engine.global().module("math").func("add", |a: i32, b: i32| a + b);
//! engine.initialize()?;
//! engine.run_source("import { add } from 'math'; export const sum = add(1, 2);", "main.js");
//! ```
//!
//! ## Modules
//!
//! - [`scripting`]: QuickJS bridge (conversion, callables, namespaces, loader, engine)
//! - [`core`]: application wiring, frame loop, bytecode embedding, errors
//! - [`platform`]: backend contract with headless and winit backends
//! - [`bindings`]: `print`, `console` and `graphics` for scripts
//! - [`config`]: configuration files and environment overrides

/// Native modules exposed to scripts
pub mod bindings;
/// Configuration system
pub mod config;
/// Core runtime: app, frame loop, embedding, errors
pub mod core;
/// Platform abstraction layer
pub mod platform;
/// QuickJS scripting bridge
pub mod scripting;

pub use crate::config::LoveConfig;
pub use crate::core::{App, EngineError, EngineResult, Mode};
pub use crate::scripting::{Engine, Namespace};
