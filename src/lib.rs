pub mod cli;
pub mod config;
pub mod invoke;
pub mod logging;

use anyhow::{Context, Result, anyhow};
use serde_json::json;
use std::path::Path;
use std::time::Instant;

/// Runs the wrapper and returns the process exit code: 0 on success, the
/// tool's own code when it fails, 127/126 when it cannot be launched.
pub fn run(cli: cli::Cli) -> Result<u8> {
    let run_start = Instant::now();
    let settings = config::load_settings(&cli).with_context(|| {
        format!(
            "failed to load config from {}",
            settings_path_for_error(&cli)
        )
    })?;

    if let Some(cli::Command::Doctor) = cli.command {
        return run_doctor(&cli, &settings);
    }

    let (Some(reference), Some(degraded)) = (cli.reference_file.clone(), cli.degraded_file.clone())
    else {
        // clap enforces the positionals; this only guards direct library callers.
        return Err(anyhow!(
            "a reference file and a degraded file are required (soundgrade <REFERENCE_FILE> <DEGRADED_FILE>)"
        ));
    };

    let log_path = logging::init()?;
    if cli.verbose {
        eprintln!("log: {}", log_path.to_string_lossy());
    }

    logging::info(
        "run.start",
        json!({
            "reference_file": reference.to_string_lossy(),
            "degraded_file": degraded.to_string_lossy(),
            "tool_binary": &settings.tool_binary,
            "model_file": settings.model_file.as_ref().map(|p| p.to_string_lossy()),
            "dry_run": cli.dry_run,
            "verbose": cli.verbose,
            "meta": logging::event_fields(),
            "log_path": log_path.to_string_lossy(),
        }),
    );

    let invocation = match invoke::Invocation::prepare(&settings, reference, degraded) {
        Ok(invocation) => invocation,
        Err(failure) => return Ok(report_launch_failure(failure, run_start)),
    };

    if cli.verbose {
        eprintln!("tool: {}", invocation.program.to_string_lossy());
        eprintln!("model: {}", invocation.model.to_string_lossy());
    }

    if cli.dry_run {
        eprintln!("{}", invocation.to_command_line());
        logging::info(
            "run.end",
            json!({
                "status": "dry_run",
                "duration_ms": run_start.elapsed().as_millis(),
            }),
        );
        return Ok(0);
    }

    logging::info(
        "tool.spawn",
        json!({
            "program": invocation.program.to_string_lossy(),
            "argv": invocation
                .argv()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect::<Vec<_>>(),
        }),
    );

    match invocation.status() {
        Err(failure) => Ok(report_launch_failure(failure, run_start)),
        Ok(status) if status.success() => {
            logging::info(
                "run.end",
                json!({
                    "status": "ok",
                    "exit_code": 0,
                    "duration_ms": run_start.elapsed().as_millis(),
                }),
            );
            Ok(0)
        }
        Ok(status) => {
            let code = invoke::exit_code_for(&status);
            eprintln!("visqol failed ({})", invoke::describe_status(&status));
            logging::warn(
                "run.end",
                json!({
                    "status": "tool_failed",
                    "tool_status": invoke::describe_status(&status),
                    "exit_code": code,
                    "duration_ms": run_start.elapsed().as_millis(),
                }),
            );
            Ok(code)
        }
    }
}

fn report_launch_failure(failure: invoke::LaunchFailure, run_start: Instant) -> u8 {
    let code = failure.exit_code();
    eprintln!("error: {failure}");
    logging::error(
        "run.end",
        json!({
            "status": "launch_failed",
            "error": failure.to_string(),
            "exit_code": code,
            "duration_ms": run_start.elapsed().as_millis(),
        }),
    );
    code
}

fn run_doctor(cli: &cli::Cli, settings: &config::Settings) -> Result<u8> {
    let availability = invoke::ToolAvailability::detect(settings);
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    println!("config: {}", config_path.to_string_lossy());
    println!("log: {}", logging::default_log_path().to_string_lossy());
    println!("tool spec: {}", settings.tool_binary);
    match &availability.binary {
        Some(path) => println!("tool: {}", path.to_string_lossy()),
        None => println!("tool: not found"),
    }
    match &availability.model {
        Some(path) if path.is_file() => println!("model: {}", path.to_string_lossy()),
        Some(path) => println!("model: {} (missing)", path.to_string_lossy()),
        None => println!("model: unknown until the tool is found"),
    }

    let healthy = availability.binary.is_some()
        && availability.model.as_deref().is_some_and(Path::is_file);
    Ok(if healthy { 0 } else { 1 })
}

fn settings_path_for_error(cli: &cli::Cli) -> String {
    cli.config
        .as_deref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| config::default_config_path().to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> cli::Cli {
        cli::Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn unresolvable_tool_maps_to_the_not_found_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("absent.toml");
        let cli = parse(&[
            "soundgrade",
            "ref.wav",
            "deg.wav",
            "--config",
            config.to_str().unwrap(),
            "--tool",
            "/nonexistent/visqol-test-binary",
        ]);

        assert_eq!(run(cli).unwrap(), invoke::EXIT_TOOL_NOT_FOUND);
    }

    #[cfg(unix)]
    #[test]
    fn dry_run_never_spawns_the_tool() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = dir.path().join("visqol");
        std::fs::write(&script, format!("#!/bin/sh\ntouch {}\n", marker.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = dir.path().join("absent.toml");
        let cli = parse(&[
            "soundgrade",
            "ref.wav",
            "deg.wav",
            "--dry-run",
            "--config",
            config.to_str().unwrap(),
            "--tool",
            script.to_str().unwrap(),
        ]);

        assert_eq!(run(cli).unwrap(), 0);
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn tool_exit_code_is_mirrored() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("visqol");
        std::fs::write(&script, "#!/bin/sh\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = dir.path().join("absent.toml");
        let cli = parse(&[
            "soundgrade",
            "ref.wav",
            "deg.wav",
            "--config",
            config.to_str().unwrap(),
            "--tool",
            script.to_str().unwrap(),
        ]);

        assert_eq!(run(cli).unwrap(), 2);
    }
}
