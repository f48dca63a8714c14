use std::collections::HashMap;

/// Standard variable name for the target's input text
pub const VAR_MODEL_INPUT: &str = "model_input";
/// Standard variable name for the target's output text
pub const VAR_MODEL_OUTPUT: &str = "model_output";

/// Substitute `{{name}}` placeholders with the supplied variables.
///
/// Only supplied variables are replaced; unresolved placeholders are left
/// verbatim so callers can detect malformed templates downstream. Pure
/// function: rendering with the same bindings is idempotent.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (name, value) in variables {
        let placeholder = format!("{{{{{name}}}}}");
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

/// The standard binding used by every evaluation judge call
pub fn standard_variables(model_input: &str, model_output: &str) -> HashMap<String, String> {
    HashMap::from([
        (VAR_MODEL_INPUT.to_string(), model_input.to_string()),
        (VAR_MODEL_OUTPUT.to_string(), model_output.to_string()),
    ])
}
