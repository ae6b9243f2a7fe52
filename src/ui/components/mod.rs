mod branch_tabs;
mod command_line;
mod key_result;

pub use branch_tabs::BranchTabs;
pub use command_line::{CommandEvent, CommandLine};
pub use key_result::KeyResult;
