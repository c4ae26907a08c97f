//! Session boundary supplying the current auth token.
//!
//! `Session` is a shared, observable holder of the signed-in user's token.
//! Its initial state is "signed out". Queries and mutations re-read the
//! token every time they run, so signing in or out takes effect on the
//! next read without rebuilding anything.

pub mod session;

pub use session::{Session, SessionData};
