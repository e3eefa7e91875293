//! Collect submit inputs against the argument metadata announced at init.

use graphrun_types::{ArgumentMetadata, ArgumentType, InputValues};
use serde_json::Value;
use thiserror::Error;

/// Problems with caller-provided input values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown argument '{name}'; expected one of: {}", known.join(", "))]
    UnknownArgument { name: String, known: Vec<String> },

    #[error("expected NAME=VALUE, got '{raw}'")]
    Malformed { raw: String },
}

/// Split a `name=value` assignment. Only the first `=` separates.
pub fn parse_assignment(raw: &str) -> Result<(String, String), InputError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(InputError::Malformed { raw: raw.to_string() }),
    }
}

/// Build the submit body from raw values, ordered as the arguments were announced.
///
/// Every provided name must match an announced argument. Announced arguments
/// without a value are left out of the body. `STRING` and `IMAGE` values are
/// sent as JSON strings; values for unrecognized types are sent as JSON when
/// they parse and as strings otherwise.
pub fn collect_inputs<I>(args: &[ArgumentMetadata], provided: I) -> Result<InputValues, InputError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut provided: InputValues = provided.into_iter().map(|(name, value)| (name, Value::String(value))).collect();

    if let Some(unknown) = provided.keys().find(|name| !args.iter().any(|argument| &argument.name == *name)) {
        return Err(InputError::UnknownArgument {
            name: unknown.clone(),
            known: args.iter().map(|argument| argument.name.clone()).collect(),
        });
    }

    let mut inputs = InputValues::new();
    for argument in args {
        let Some(value) = provided.shift_remove(&argument.name) else {
            continue;
        };
        let value = match (argument.r#type, value) {
            (ArgumentType::Other, Value::String(text)) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            (_, value) => value,
        };
        inputs.insert(argument.name.clone(), value);
    }
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args() -> Vec<ArgumentMetadata> {
        vec![
            ArgumentMetadata {
                name: "question".into(),
                r#type: ArgumentType::String,
            },
            ArgumentMetadata {
                name: "photo".into(),
                r#type: ArgumentType::Image,
            },
            ArgumentMetadata {
                name: "limits".into(),
                r#type: ArgumentType::Other,
            },
        ]
    }

    #[test]
    fn inputs_follow_announcement_order_and_skip_missing() {
        let inputs = collect_inputs(
            &args(),
            vec![
                ("limits".to_string(), r#"{"max":3}"#.to_string()),
                ("question".to_string(), "hello".to_string()),
            ],
        )
        .expect("inputs");

        let names: Vec<&str> = inputs.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["question", "limits"]);
        assert_eq!(inputs["question"], json!("hello"));
        assert_eq!(inputs["limits"], json!({"max": 3}));
    }

    #[test]
    fn textual_types_stay_strings_even_when_json_like() {
        let inputs = collect_inputs(&args(), vec![("question".to_string(), "42".to_string())]).expect("inputs");
        assert_eq!(inputs["question"], json!("42"));
    }

    #[test]
    fn unknown_argument_is_rejected() {
        let error = collect_inputs(&args(), vec![("q".to_string(), "hello".to_string())]).unwrap_err();
        assert!(matches!(error, InputError::UnknownArgument { ref name, .. } if name == "q"));
        assert!(error.to_string().contains("question, photo, limits"));
    }

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(parse_assignment("q=a=b").unwrap(), ("q".to_string(), "a=b".to_string()));
        assert_eq!(parse_assignment("q=").unwrap(), ("q".to_string(), String::new()));
        assert!(parse_assignment("=value").is_err());
        assert!(parse_assignment("novalue").is_err());
    }
}
