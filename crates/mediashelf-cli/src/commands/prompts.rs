use color_eyre::Result;
use dialoguer::{Confirm, Input, Password};

/// Prompt for a string value with optional default
pub fn prompt_string(prompt: &str, default: Option<&str>) -> Result<String> {
    let mut input_builder = Input::<String>::new().with_prompt(prompt).allow_empty(true);

    if let Some(default_value) = default {
        input_builder = input_builder.default(default_value.to_string());
    }

    input_builder
        .interact_text()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read input: {}", e))
}

/// Prompt for a secret (masked input)
pub fn prompt_password(prompt: &str) -> Result<String> {
    Password::new()
        .with_prompt(prompt)
        .interact()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read password: {}", e))
}

/// Prompt for yes/no with optional default
pub fn prompt_yes_no(prompt: &str, default: Option<bool>) -> Result<bool> {
    let mut confirm_builder = Confirm::new().with_prompt(prompt);

    if let Some(default_value) = default {
        confirm_builder = confirm_builder.default(default_value);
    }

    confirm_builder
        .interact()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to read confirmation: {}", e))
}

/// Prompt for a number, re-asking until the input parses
pub fn prompt_number(prompt: &str, default: Option<u32>) -> Result<u32> {
    loop {
        let mut input_builder = Input::<String>::new().with_prompt(prompt);

        if let Some(default_value) = default {
            input_builder = input_builder.default(default_value.to_string());
        }

        let input = input_builder
            .interact_text()
            .map_err(|e| color_eyre::eyre::eyre!("Failed to read input: {}", e))?;

        match parse_number(&input, default) {
            Some(num) => return Ok(num),
            None => eprintln!("Invalid input. Please enter a valid number."),
        }
    }
}

fn parse_number(input: &str, default: Option<u32>) -> Option<u32> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return default;
    }
    trimmed.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 42 ", None), Some(42));
        assert_eq!(parse_number("", Some(7)), Some(7));
        assert_eq!(parse_number("", None), None);
        assert_eq!(parse_number("-3", None), None);
    }
}
