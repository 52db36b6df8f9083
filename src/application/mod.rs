//! Application layer: the transaction editor and everything it orchestrates.
//!
//! [`editor::TransactionEditor`] is the entry point for edits. Object kinds plug
//! in through a [`profile::EditorProfile`] holding their handler registry;
//! committed edits produce effects that [`dispatcher::EffectDispatcher`] runs.

pub mod authorizer;
pub mod destruction;
pub mod dispatcher;
pub mod editor;
pub mod handler;
pub mod mail;
pub mod post;
pub mod profile;
pub mod project;
pub mod renderer;
