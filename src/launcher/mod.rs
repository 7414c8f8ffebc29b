mod event_loop;
pub mod frontend;

pub use event_loop::{ ERROR_RESULT_ID, InputEvent, Launcher, LoopState, Message, Screen };
