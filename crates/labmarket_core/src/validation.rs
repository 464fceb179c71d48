//! crates/labmarket_core/src/validation.rs
//!
//! Sanitization and validation of seller input.
//!
//! Every free-text field goes through two separate steps: `sanitize_*` trims
//! and rejects malformed input (embedded NUL, over-length), then the
//! validators apply the field rules. Both steps report `FieldError`s, collected
//! per draft into `ValidationErrors`, and both run before any store call.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::domain::{Condition, ListingFields, ProfileFields};

pub const NAME_MAX: usize = 200;
pub const BRAND_MAX: usize = 100;
pub const MODEL_MAX: usize = 100;
pub const CATEGORY_MAX: usize = 100;
pub const LOCATION_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 5000;
pub const FULL_NAME_MAX: usize = 100;
pub const COMPANY_MAX: usize = 100;

static FULL_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L} '\-]+$").expect("full name pattern is a valid regex")
});

//=========================================================================================
// Error Types
//=========================================================================================

/// A single rejected field, reported inline next to that field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// All field errors found in one draft.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// The first message reported for `field`, if any.
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join("; "))
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(error: FieldError) -> Self {
        Self(vec![error])
    }
}

//=========================================================================================
// Sanitization
//=========================================================================================

/// Trims `raw` and rejects embedded NUL bytes or more than `max_chars` characters.
pub fn sanitize_text(field: &'static str, raw: &str, max_chars: usize) -> Result<String, FieldError> {
    if raw.contains('\0') {
        return Err(FieldError::new(field, "Contains disallowed characters"));
    }
    let trimmed = raw.trim();
    if trimmed.chars().count() > max_chars {
        return Err(FieldError::new(
            field,
            format!("Must be at most {} characters", max_chars),
        ));
    }
    Ok(trimmed.to_string())
}

/// Like `sanitize_text`, but empty input becomes `None`.
pub fn sanitize_optional(
    field: &'static str,
    raw: Option<&str>,
    max_chars: usize,
) -> Result<Option<String>, FieldError> {
    match raw {
        None => Ok(None),
        Some(raw) => {
            let clean = sanitize_text(field, raw, max_chars)?;
            Ok((!clean.is_empty()).then_some(clean))
        }
    }
}

//=========================================================================================
// Listing Drafts
//=========================================================================================

/// Raw listing form input, exactly as the seller typed it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingDraft {
    pub name: String,
    pub brand: String,
    pub model: Option<String>,
    pub description: Option<String>,
    /// Coerced to a number during validation.
    pub price: String,
    pub condition: String,
    pub category: String,
    pub location: Option<String>,
}

impl ListingDraft {
    /// Prefills the form from a stored listing.
    pub fn from_fields(fields: &ListingFields) -> Self {
        Self {
            name: fields.name.clone(),
            brand: fields.brand.clone(),
            model: fields.model.clone(),
            description: fields.description.clone(),
            price: fields.price.to_string(),
            condition: fields.condition.to_string(),
            category: fields.category.clone(),
            location: fields.location.clone(),
        }
    }
}

/// Coerces form input to a positive, finite price.
pub fn coerce_price(raw: &str) -> Result<f64, FieldError> {
    let trimmed = raw.trim();
    // An empty input box coerces to zero, which then fails the positivity rule.
    let value = if trimmed.is_empty() {
        0.0
    } else {
        trimmed
            .parse::<f64>()
            .map_err(|_| FieldError::new("price", "Price must be a number"))?
    };
    if !value.is_finite() {
        return Err(FieldError::new("price", "Price must be a number"));
    }
    if value <= 0.0 {
        return Err(FieldError::new("price", "Price must be a positive number"));
    }
    Ok(value)
}

fn min_chars(field: &'static str, value: &str, min: usize, message: &str, errors: &mut ValidationErrors) {
    if value.chars().count() < min {
        errors.push(FieldError::new(field, message));
    }
}

/// Sanitizes and validates a listing draft.
///
/// All fields are checked so the form can show every problem at once.
pub fn validate_listing(draft: &ListingDraft) -> Result<ListingFields, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let mut required = |field: &'static str, raw: &str, max: usize| {
        sanitize_text(field, raw, max).unwrap_or_else(|e| {
            errors.push(e);
            String::new()
        })
    };
    let name = required("name", &draft.name, NAME_MAX);
    let brand = required("brand", &draft.brand, BRAND_MAX);
    let category = required("category", &draft.category, CATEGORY_MAX);

    let mut optional = |field: &'static str, raw: Option<&String>, max: usize| {
        sanitize_optional(field, raw.map(String::as_str), max).unwrap_or_else(|e| {
            errors.push(e);
            None
        })
    };
    let model = optional("model", draft.model.as_ref(), MODEL_MAX);
    let description = optional("description", draft.description.as_ref(), DESCRIPTION_MAX);
    let location = optional("location", draft.location.as_ref(), LOCATION_MAX);

    // Fields that failed sanitization already carry an error; skip their rules.
    if errors.for_field("name").is_none() {
        min_chars("name", &name, 3, "Name must be at least 3 characters long", &mut errors);
    }
    if errors.for_field("brand").is_none() {
        min_chars("brand", &brand, 2, "Brand is required", &mut errors);
    }
    if errors.for_field("category").is_none() {
        min_chars("category", &category, 2, "Category is required", &mut errors);
    }

    let price = coerce_price(&draft.price).map_err(|e| errors.push(e)).ok();
    let condition = draft
        .condition
        .trim()
        .parse::<Condition>()
        .map_err(|_| {
            errors.push(FieldError::new(
                "condition",
                "Condition must be one of new, excellent, good, fair, poor",
            ))
        })
        .ok();

    match (price, condition) {
        (Some(price), Some(condition)) if errors.is_empty() => Ok(ListingFields {
            name,
            brand,
            model,
            description,
            price,
            condition,
            category,
            location,
        }),
        _ => Err(errors),
    }
}

//=========================================================================================
// Profile Drafts
//=========================================================================================

/// Raw profile form input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileDraft {
    pub full_name: String,
    pub company: Option<String>,
}

pub fn validate_profile(draft: &ProfileDraft) -> Result<ProfileFields, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let full_name = match sanitize_text("full_name", &draft.full_name, FULL_NAME_MAX) {
        Ok(name) if name.chars().count() < 2 => {
            errors.push(FieldError::new(
                "full_name",
                "Full name must be at least 2 characters.",
            ));
            name
        }
        Ok(name) if !FULL_NAME_PATTERN.is_match(&name) => {
            errors.push(FieldError::new(
                "full_name",
                "Full name may only contain letters, spaces, hyphens and apostrophes.",
            ));
            name
        }
        Ok(name) => name,
        Err(e) => {
            errors.push(e);
            String::new()
        }
    };

    let company = sanitize_optional("company", draft.company.as_deref(), COMPANY_MAX)
        .unwrap_or_else(|e| {
            errors.push(e);
            None
        });

    if errors.is_empty() {
        Ok(ProfileFields { full_name, company })
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ListingDraft {
        ListingDraft {
            name: "  Olympus BX51 ".into(),
            brand: "Olympus".into(),
            model: Some("   ".into()),
            description: Some("Upright microscope".into()),
            price: "1250.50".into(),
            condition: "excellent".into(),
            category: "Microscopes".into(),
            location: None,
        }
    }

    #[test]
    fn valid_draft_is_trimmed_and_normalized() {
        let fields = validate_listing(&draft()).unwrap();
        assert_eq!(fields.name, "Olympus BX51");
        assert_eq!(fields.model, None);
        assert_eq!(fields.price, 1250.5);
        assert_eq!(fields.condition, Condition::Excellent);
    }

    #[test]
    fn non_positive_or_non_numeric_prices_are_rejected() {
        for raw in ["0", "-3", "", "abc", "NaN", "inf"] {
            let mut d = draft();
            d.price = raw.into();
            let errors = validate_listing(&d).unwrap_err();
            assert!(errors.for_field("price").is_some(), "price {raw:?} accepted");
        }
    }

    #[test]
    fn collects_every_field_error() {
        let d = ListingDraft {
            name: "ab".into(),
            brand: "x".into(),
            price: "0".into(),
            condition: "mint".into(),
            category: "".into(),
            ..Default::default()
        };
        let errors = validate_listing(&d).unwrap_err();
        for field in ["name", "brand", "price", "condition", "category"] {
            assert!(errors.for_field(field).is_some(), "missing error for {field}");
        }
    }

    #[test]
    fn name_length_counts_after_trimming() {
        let mut d = draft();
        d.name = "  ab  ".into();
        assert!(validate_listing(&d).unwrap_err().for_field("name").is_some());
    }

    #[test]
    fn sanitization_rejects_nul_and_over_length() {
        let mut d = draft();
        d.description = Some("fine\0print".into());
        d.location = Some("x".repeat(LOCATION_MAX + 1));
        let errors = validate_listing(&d).unwrap_err();
        assert_eq!(
            errors.for_field("description"),
            Some("Contains disallowed characters")
        );
        assert!(errors.for_field("location").unwrap().contains("at most"));
    }

    #[test]
    fn profile_name_allows_letters_spaces_hyphens_apostrophes() {
        let ok = ProfileDraft {
            full_name: "Siobhán O'Neil-Żak".into(),
            company: Some("  ".into()),
        };
        let fields = validate_profile(&ok).unwrap();
        assert_eq!(fields.company, None);

        let bad = ProfileDraft {
            full_name: "R2-D2".into(),
            company: None,
        };
        assert!(validate_profile(&bad).unwrap_err().for_field("full_name").is_some());
    }

    #[test]
    fn profile_company_is_length_limited() {
        let d = ProfileDraft {
            full_name: "Ada Lovelace".into(),
            company: Some("c".repeat(COMPANY_MAX + 1)),
        };
        assert!(validate_profile(&d).unwrap_err().for_field("company").is_some());
    }
}
