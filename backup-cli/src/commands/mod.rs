mod config;
mod history;
mod status;
mod sweep;
mod trigger;

// Sweep commands
pub use sweep::{run_serve, run_sweep};

// Manual backup commands
pub use trigger::run_trigger;

// History commands
pub use history::run_history;

// Config commands
pub use config::{delete_config, put_config, show_config};

// Status commands
pub use status::{list_projects, run_health};
