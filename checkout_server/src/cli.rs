use std::{env, env::VarError};

/// The server takes no arguments. Passing any prints the help text and the current configuration.
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
    // Only variables that never hold secrets. Tenant signing secrets live in the database.
    const DISPLAY_ENVS: [&str; 8] = [
        "RUST_LOG",
        "CKO_HOST",
        "CKO_PORT",
        "CKO_DATABASE_URL",
        "CKO_DB_MAX_CONNECTIONS",
        "CKO_RUN_MIGRATIONS",
        "CKO_RESERVATION_TTL",
        "CKO_SWEEP_INTERVAL",
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
