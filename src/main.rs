// main.rs

use color_eyre::eyre::{eyre, Result};
use colored::Colorize;
use mafrw::blackbox::{Blackbox, Model};
use mafrw::config::Config;
use std::env;
use std::path::Path;
use std::sync::Arc;

/// Plays the role the solver expects of a blackbox executable: take the
/// coordinate file as the only argument, print the evaluated line to stdout.
fn main() -> Result<()> {
    color_eyre::install()?;
    cli_log::init_cli_log!();

    // Load configuration file, falling back to defaults when absent
    let config_path = Path::new("config.json");
    let config = if config_path.exists() {
        Config::load(config_path).map_err(|e| eyre!("error loading configuration: {}", e))?
    } else {
        Config::default()
    };

    let input = env::args()
        .nth(1)
        .ok_or_else(|| eyre!("usage: mafrw <input-file>"))?;

    // Demo model: sphere objective with one unit-ball constraint.
    let model: Model = Arc::new(|point: &[f64]| {
        let objective = point.iter().map(|x| x * x).sum::<f64>();
        (objective, vec![objective - 1.0])
    });

    let blackbox = Blackbox::new(&config.environment_name, model, config.poll_interval());
    let line = blackbox.run(Path::new(&input))?;
    println!("{}", line.bold());
    Ok(())
}
