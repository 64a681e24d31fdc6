//! Invocation handlers.

mod command;
mod login;

pub(crate) use command::handle_command;
pub(crate) use login::handle_login;
