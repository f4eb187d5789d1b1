// Copyright (c) 2024 Mike Tsao

//! Musical and absolute time expressions, and the tempo context that turns
//! them into seconds.

/// The most commonly used imports.
pub mod prelude {
    pub use super::{Notation, NoteModifier, TimeContext, TimeExpr, TransportPosition};
}

pub use context::TimeContext;
pub use expr::{Notation, NoteModifier, Operator, TimeExpr, TransportPosition};

mod context;
mod expr;
