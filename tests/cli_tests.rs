use serde_json::Value as JsonValue;
use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_tsflow-runner");

fn run(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(BIN);
    command
        .args(args)
        .env_remove("TSFLOW_TIMEOUT_SECS")
        .env_remove("TSFLOW_PROBE_TIMEOUT_SECS")
        .env_remove("TSFLOW_SEARCH_LIMIT")
        .env_remove("TSFLOW_LOG");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().unwrap()
}

/// Stdout must hold exactly one JSON object.
fn envelope(output: &Output) -> JsonValue {
    let stdout = String::from_utf8(output.stdout.clone()).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "stdout was {:?}", stdout);
    let value: JsonValue = serde_json::from_str(lines[0]).unwrap();
    assert!(value.is_object());
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_arguments_print_usage() {
        for args in [&[][..], &["checkAuthStatus"][..]] {
            let output = run(args, &[]);
            assert_eq!(output.status.code(), Some(1));
            let value = envelope(&output);
            assert_eq!(value["success"], false);
            assert!(value["message"].as_str().unwrap().starts_with("Usage:"));
        }
    }

    #[test]
    fn test_check_auth_status() {
        let output = run(&["checkAuthStatus", "[]"], &[]);
        assert_eq!(output.status.code(), Some(0));
        let value = envelope(&output);
        assert_eq!(value["success"], true);
        assert_eq!(value["isAuthenticated"], false);
        assert_eq!(value["message"], "Not authenticated");
    }

    #[test]
    fn test_extra_arguments_are_ignored() {
        let output = run(&["checkAuthStatus", "[]", "extra", "--more"], &[]);
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(envelope(&output)["success"], true);
    }

    #[test]
    fn test_arguments_must_be_a_json_array() {
        for raw in ["not json", r#"{"sensorNames":["TEMP.1"]}"#] {
            let output = run(&["searchSensorsOnly", raw], &[]);
            assert_eq!(output.status.code(), Some(1));
            let value = envelope(&output);
            assert_eq!(value["success"], false);
            assert!(value["error"].as_str().unwrap().starts_with("Execution error:"));
        }
    }

    #[test]
    fn test_unknown_operation_is_an_operation_failure() {
        let output = run(&["fetchEverything", "[]"], &[]);
        assert_eq!(output.status.code(), Some(0));
        let value = envelope(&output);
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "Unknown function: fetchEverything");
    }

    #[test]
    fn test_invalid_settings_still_answer_in_json() {
        for (key, value) in [("TSFLOW_TIMEOUT_SECS", "abc"), ("TSFLOW_SEARCH_LIMIT", "-5")] {
            let output = run(&["checkAuthStatus", "[]"], &[(key, value)]);
            assert_eq!(output.status.code(), Some(1));
            let envelope = envelope(&output);
            assert_eq!(envelope["success"], false);
            assert_eq!(envelope["error"], "Invalid arguments");
        }
    }

    #[test]
    fn test_logs_stay_off_stdout() {
        let output = run(&["checkAuthStatus", "[]"], &[("TSFLOW_LOG", "trace")]);
        assert_eq!(output.status.code(), Some(0));
        envelope(&output);
    }
}
