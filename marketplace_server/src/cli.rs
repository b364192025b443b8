use std::{env, env::VarError};

/// The server takes no arguments. Passing any prints the help text and the current settings.
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Only list the variables the server reads, so nothing unrelated from the environment leaks into the output
    const DISPLAY_ENVS: [&str; 9] = [
        "RUST_LOG",
        "MKP_HOST",
        "MKP_PORT",
        "MKP_DATABASE_URL",
        "MKP_DB_MAX_CONNECTIONS",
        "MKP_HOLD_WINDOW_MINUTES",
        "MKP_SWEEP_INTERVAL_SECS",
        "MKP_RUN_MIGRATIONS",
        "MKP_EVENT_BUFFER_SIZE",
    ];

    println!("Current environment values:");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
