use crate::error::ValidationError;

pub const DEFAULT_THEME: &str = "light";

/// Trimmed, lowercased email. Empty input is rejected.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::Empty { field: "email" });
    }
    Ok(email)
}

/// Splits a display name into first and last name on whitespace.
///
/// Only the first two words are kept. Blank input yields `None` so callers leave
/// the stored name untouched.
pub fn split_name(full: &str) -> Option<(String, String)> {
    let mut parts = full.split_whitespace();
    let first = parts.next()?.to_string();
    let last = parts.next().unwrap_or_default().to_string();
    Some((first, last))
}

pub fn normalize_theme(theme: Option<&str>) -> &'static str {
    match theme.map(str::trim) {
        Some("dark") => "dark",
        _ => DEFAULT_THEME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(
            normalize_email("  Rana.Haddad@Example.EDU ").unwrap(),
            "rana.haddad@example.edu"
        );
        assert!(normalize_email("   ").is_err());
    }

    #[test]
    fn names_split_into_first_and_last() {
        assert_eq!(
            split_name("Karim  Aoun"),
            Some(("Karim".to_string(), "Aoun".to_string()))
        );
        assert_eq!(split_name("Maya"), Some(("Maya".to_string(), String::new())));
        assert_eq!(
            split_name("Lea Marie Khoury"),
            Some(("Lea".to_string(), "Marie".to_string()))
        );
        assert_eq!(split_name("  "), None);
    }

    #[test]
    fn unknown_themes_fall_back_to_light() {
        assert_eq!(normalize_theme(Some("dark")), "dark");
        assert_eq!(normalize_theme(Some("solarized")), "light");
        assert_eq!(normalize_theme(None), "light");
    }
}
