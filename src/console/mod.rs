pub mod input;
pub mod render;
pub mod state;

pub use input::{HELP, InputAction, parse_line};
pub use state::ConsoleState;
