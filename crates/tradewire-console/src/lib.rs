/*
[INPUT]:  Console profile, tradewire-session supervisor
[OUTPUT]: Public console API (profile loading, session handler)
[POS]:    Library root for the headless venue console
[UPDATE]: When adding new console modules
*/

pub mod console;
pub mod profile;

pub use console::ConsoleHandler;
pub use profile::{CallConfig, ConsoleProfile, PrefixConfig, PublishConfig};
