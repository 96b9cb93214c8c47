pub mod cli_models;
pub mod settings;
pub mod switch_yaml;

pub const VSWITCH_SETTINGS_FOLDER: &str = "/var/lib/vswitch-compose/";
