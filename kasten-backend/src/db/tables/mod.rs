//! `impl Database` blocks, one module per table group

mod links;
mod notes;
