use crate::discord::Command;

pub mod help;
pub mod info;
pub mod owner;

/// Commands that belong to no extension and are always available.
pub fn list() -> Vec<Command> {
    vec![
        help::help(),
        info::about(),
        owner::extension(),
        owner::shutdown(),
    ]
}
