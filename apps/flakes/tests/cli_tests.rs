//! Integration tests for the command-line front end.

#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use flakes::FlakesConfig;
use flakes::cli::{Cli, Commands, execute};
use flakes_core::primitives::MAX_ARRAY_LENGTH;
use flakes_core::{FlakesError, SaveGame};
use std::path::Path;

fn run(args: &[&str]) -> Result<(), FlakesError> {
    let mut argv = vec!["flakes", "--quiet"];
    argv.extend_from_slice(args);
    execute(Cli::try_parse_from(argv).unwrap())
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

// =============================================================================
// ARGUMENT PARSING
// =============================================================================

#[test]
fn test_parse_save_command() {
    let cli = Cli::try_parse_from(["flakes", "-p", "Json", "save", "-o", "out.sav", "--children", "3"]).unwrap();
    assert_eq!(cli.provider.as_deref(), Some("Json"));
    match cli.command {
        Some(Commands::Save { output, children }) => {
            assert_eq!(output, Path::new("out.sav"));
            assert_eq!(children, 3);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_selftest_mode_flags_conflict() {
    assert!(Cli::try_parse_from(["flakes", "selftest", "--raw-only", "--compressed-only"]).is_err());
}

#[test]
fn test_children_limit_is_enforced_at_parse_time() {
    let too_many = (MAX_ARRAY_LENGTH + 1).to_string();
    let at_limit = MAX_ARRAY_LENGTH.to_string();
    assert!(Cli::try_parse_from(["flakes", "save", "-o", "out.sav", "--children", &too_many]).is_err());
    assert!(Cli::try_parse_from(["flakes", "selftest", "--children", &too_many]).is_err());
    assert!(Cli::try_parse_from(["flakes", "save", "-o", "out.sav", "--children", &at_limit]).is_ok());
    assert!(Cli::try_parse_from(["flakes", "selftest", "--children", "-1"]).is_err());
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn test_json_mode_output_succeeds() {
    run(&["--json-mode", "providers"]).unwrap();
    run(&["--json-mode", "config"]).unwrap();
    run(&["--json-mode", "--provider", "Json", "selftest", "--raw-only", "--children", "2"]).unwrap();
}

#[test]
fn test_selftest_passes_for_every_provider() {
    run(&["selftest", "--children", "4"]).unwrap();
}

#[test]
fn test_selftest_single_provider_raw() {
    run(&["--provider", "NetBinary", "selftest", "--raw-only"]).unwrap();
}

#[test]
fn test_unknown_provider_fails() {
    let result = run(&["--provider", "Yaml", "providers"]);
    assert!(matches!(result, Err(FlakesError::UnknownProvider(_))));
}

#[test]
fn test_save_inspect_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("hero.sav");

    run(&["--provider", "PrettyJson", "save", "-o", path_str(&file), "--children", "5"]).unwrap();
    assert!(file.exists());

    let save = SaveGame::from_bytes(&std::fs::read(&file).unwrap()).unwrap();
    assert_eq!(save.provider, "PrettyJson");
    assert!(save.compressed);

    run(&["inspect", "-i", path_str(&file)]).unwrap();
    // The file's provider is used, whatever the default.
    run(&["--provider", "Binary", "--json-mode", "load", "-i", path_str(&file)]).unwrap();
}

#[test]
fn test_inspect_rejects_corrupt_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("broken.sav");
    std::fs::write(&file, b"not a save file").unwrap();

    assert!(run(&["inspect", "-i", path_str(&file)]).is_err());
    assert!(run(&["load", "-i", path_str(&file)]).is_err());
}

#[test]
fn test_missing_input_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.sav");
    let result = run(&["inspect", "-i", path_str(&missing)]);
    assert!(matches!(result, Err(FlakesError::IoError(_))));
}

// =============================================================================
// CONFIGURATION
// =============================================================================

#[test]
fn test_config_file_drives_save() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("flakes.toml");
    std::fs::write(
        &config,
        "default_provider = \"NetBinary\"\n[compression]\nlevel = \"none\"\n",
    )
    .unwrap();
    let file = dir.path().join("raw.sav");

    run(&["--config", path_str(&config), "save", "-o", path_str(&file)]).unwrap();
    let save = SaveGame::from_bytes(&std::fs::read(&file).unwrap()).unwrap();
    assert_eq!(save.provider, "NetBinary");
    assert!(!save.compressed);

    run(&["--config", path_str(&config), "load", "-i", path_str(&file)]).unwrap();
    run(&["--config", path_str(&config), "--json-mode", "config"]).unwrap();
}

#[test]
fn test_config_load_records_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[ownership]\npolicy = \"strict_outer\"\n").unwrap();

    let config = FlakesConfig::load(&path).unwrap();
    assert_eq!(config.source.as_deref(), Some(path.as_path()));
    assert!(FlakesConfig::load(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_invalid_config_fails_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    std::fs::write(&config, "default_provider = 5\n").unwrap();
    assert!(run(&["--config", path_str(&config), "providers"]).is_err());
}
