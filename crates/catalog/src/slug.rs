//! URL slugs derived from product names.

use storefront_core::{DomainError, DomainResult};

/// Derive a slug from a product name.
///
/// Lowercases, drops anything outside `[a-z0-9]`, whitespace and `-`, turns
/// whitespace runs into `-`, collapses repeated `-` and trims them from both ends.
pub fn slugify(name: &str) -> DomainResult<String> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return Err(DomainError::validation(format!(
            "cannot derive a slug from name '{name}'"
        )));
    }
    Ok(slug)
}

/// Check a caller-supplied slug: lowercase ascii words joined by single dashes.
pub fn validate_slug(slug: &str) -> DomainResult<()> {
    let well_formed = !slug.is_empty()
        && slug.len() <= 150
        && slug
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
    if !well_formed {
        return Err(DomainError::validation(format!("invalid slug '{slug}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_slug_from_name() {
        assert_eq!(slugify("iPhone 15 Pro Max").unwrap(), "iphone-15-pro-max");
        assert_eq!(slugify("  Galaxy   S24 -- Ultra ").unwrap(), "galaxy-s24-ultra");
        assert_eq!(slugify("USB-C Cable (2m)").unwrap(), "usb-c-cable-2m");
    }

    #[test]
    fn drops_characters_outside_the_slug_alphabet() {
        assert_eq!(slugify("Tai nghe Sony WH-1000XM5!").unwrap(), "tai-nghe-sony-wh-1000xm5");
        assert_eq!(slugify("Café & Co").unwrap(), "caf-co");
    }

    #[test]
    fn rejects_names_without_slug_characters() {
        assert!(matches!(slugify("!!! ???"), Err(DomainError::Validation(_))));
        assert!(matches!(slugify(""), Err(DomainError::Validation(_))));
    }

    #[test]
    fn validates_supplied_slugs() {
        assert!(validate_slug("macbook-air-m3").is_ok());
        assert!(validate_slug("MacBook").is_err());
        assert!(validate_slug("double--dash").is_err());
        assert!(validate_slug("-leading").is_err());
        assert!(validate_slug("").is_err());
    }
}
