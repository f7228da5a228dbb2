mod app;
pub mod command;
pub mod config;
pub mod display;
mod error;
pub mod export;
mod input;
pub mod keygen;
pub mod logging;
pub mod recent;
mod select_box;
pub mod session;
mod terminal;

pub use app::{App, Launcher, Outcome, ProcessLauncher};
pub use command::{CompiledCommand, Compiler, Multiplexer};
pub use config::Config;
pub use display::MenuItem;
pub use error::{Error, Result};
pub use keygen::{ConvertError, KeyConverter, Puttygen, TempKey};
pub use recent::RecentSessions;
pub use select_box::{Menu, SelectBox};
pub use session::{Session, Sessions};
