use crate::failure::{Failure, Outcome};
use regex::Regex;
use std::sync::LazyLock;

static ILLEGAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1F\x7F]"#).expect("valid pattern"));

/// Check that `name` can be used as the stem of a saved recording.
///
/// Returns the trimmed name on success.
pub fn validate_file_name(name: &str, max_len: usize) -> Outcome<&str> {
    let name = name.trim();

    if name.is_empty() {
        return Err(Failure::new("File name cannot be empty"));
    }

    if name.chars().count() > max_len {
        return Err(Failure::new(format!(
            "File name cannot be longer than {} characters",
            max_len
        )));
    }

    if name.starts_with('.') {
        return Err(Failure::new("File name cannot start with '.'"));
    }

    if let Some(found) = ILLEGAL_CHARS.find(name) {
        return Err(Failure::new(format!(
            "File name contains an illegal character: {:?}",
            found.as_str()
        )));
    }

    Ok(name)
}
