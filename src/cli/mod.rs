mod args;

pub use args::{CommandArgs, SourceKind};
