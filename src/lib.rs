//! `basin` is a compiler middle end over a typed IR. A front end builds a
//! [`middle::ir::Module`] with the [`middle::ir::builder::ModuleBuilder`];
//! the [`pipeline`] checks it, rewrites its control flow into canonical
//! form and drives a [`backend::Backend`] over the result.

pub mod backend;
pub mod diagnostics;
pub mod index;
pub mod middle;
pub mod pipeline;
