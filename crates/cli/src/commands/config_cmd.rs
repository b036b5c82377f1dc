//! `voltwise config` — Print the default configuration.

use voltwise_config::AppConfig;

pub fn print_default() {
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    print!("{}", AppConfig::default_toml());
}
