pub mod discovery;
pub mod filename;
pub mod script;

pub use script::ContentScript;
