//! Emergency form data and validation
//!
//! The form is the terminal fallback of the ladder. It is validated as a
//! whole on submit; field edits never validate on their own.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest accepted image attachment.
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Minimum trimmed description length.
pub const MIN_DESCRIPTION_CHARS: usize = 10;

static PLATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}[- ]?[A-Z]{3}$").unwrap());
static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9XYZ][0-9]{7}[A-Z]$").unwrap());

/// Reference to an image picked by the user. The bytes stay with the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub uri: String,
}

/// Why an attachment was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRejection {
    #[error("'{name}' is not an image ({mime_type})")]
    NotAnImage { name: String, mime_type: String },
    #[error("'{name}' is larger than 5 MB")]
    TooLarge { name: String, size_bytes: u64 },
}

impl ImageRef {
    /// Check type and size before the image is accepted anywhere.
    pub fn validate(&self) -> Result<(), ImageRejection> {
        if !self.mime_type.starts_with("image/") {
            return Err(ImageRejection::NotAnImage {
                name: self.name.clone(),
                mime_type: self.mime_type.clone(),
            });
        }
        if self.size_bytes > MAX_IMAGE_BYTES {
            return Err(ImageRejection::TooLarge {
                name: self.name.clone(),
                size_bytes: self.size_bytes,
            });
        }
        Ok(())
    }
}

/// Editable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    LicensePlate,
    IdNumber,
    Images,
    Description,
}

impl std::fmt::Display for FormField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LicensePlate => write!(f, "license_plate"),
            Self::IdNumber => write!(f, "id_number"),
            Self::Images => write!(f, "images"),
            Self::Description => write!(f, "description"),
        }
    }
}

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum FieldError {
    #[error("{0} is required")]
    Required(FormField),
    #[error("{0} has an invalid format")]
    InvalidFormat(FormField),
    #[error("at least one image is required")]
    MissingImage,
    #[error("description must be at least 10 characters")]
    DescriptionTooShort,
}

impl FieldError {
    pub fn field(&self) -> FormField {
        match self {
            Self::Required(field) | Self::InvalidFormat(field) => *field,
            Self::MissingImage => FormField::Images,
            Self::DescriptionTooShort => FormField::Description,
        }
    }
}

/// Data collected by the manual form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyFormData {
    pub license_plate: String,
    pub id_number: String,
    pub images: Vec<ImageRef>,
    pub description: String,
}

impl EmergencyFormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a text field. `Images` is edited through `attach_image` /
    /// `remove_image` and is ignored here.
    pub fn set_text(&mut self, field: FormField, value: &str) {
        match field {
            FormField::LicensePlate => self.license_plate = value.to_string(),
            FormField::IdNumber => self.id_number = value.to_string(),
            FormField::Description => self.description = value.to_string(),
            FormField::Images => {}
        }
    }

    pub fn attach_image(&mut self, image: ImageRef) -> Result<(), ImageRejection> {
        image.validate()?;
        self.images.push(image);
        Ok(())
    }

    /// Remove the image at `index`, if present.
    pub fn remove_image(&mut self, index: usize) -> Option<ImageRef> {
        (index < self.images.len()).then(|| self.images.remove(index))
    }

    /// Validate every field at once. Returns all failures, in field order.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        let plate = self.license_plate.trim().to_uppercase();
        if plate.is_empty() {
            errors.push(FieldError::Required(FormField::LicensePlate));
        } else if !PLATE_PATTERN.is_match(&plate) {
            errors.push(FieldError::InvalidFormat(FormField::LicensePlate));
        }

        let id = self.id_number.trim().to_uppercase();
        if id.is_empty() {
            errors.push(FieldError::Required(FormField::IdNumber));
        } else if !ID_PATTERN.is_match(&id) {
            errors.push(FieldError::InvalidFormat(FormField::IdNumber));
        }

        if self.images.is_empty() {
            errors.push(FieldError::MissingImage);
        }

        let description = self.description.trim();
        if description.is_empty() {
            errors.push(FieldError::Required(FormField::Description));
        } else if description.chars().count() < MIN_DESCRIPTION_CHARS {
            errors.push(FieldError::DescriptionTooShort);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(size_bytes: u64) -> ImageRef {
        ImageRef {
            name: "front.jpg".into(),
            mime_type: "image/jpeg".into(),
            size_bytes,
            uri: "file:///photos/front.jpg".into(),
        }
    }

    fn valid_form() -> EmergencyFormData {
        EmergencyFormData {
            license_plate: "1234 ABC".into(),
            id_number: "12345678Z".into(),
            images: vec![photo(2048)],
            description: "Rear-ended at a traffic light".into(),
        }
    }

    #[test]
    fn test_valid_form() {
        assert_eq!(valid_form().validate(), Ok(()));
    }

    #[test]
    fn test_lowercase_input_is_accepted() {
        let mut form = valid_form();
        form.set_text(FormField::LicensePlate, "1234-abc");
        form.set_text(FormField::IdNumber, "x1234567l");
        assert_eq!(form.validate(), Ok(()));
    }

    #[test]
    fn test_zero_images_is_a_field_error() {
        let mut form = valid_form();
        form.images.clear();
        let errors = form.validate().unwrap_err();
        assert_eq!(errors, vec![FieldError::MissingImage]);
        assert_eq!(errors[0].field(), FormField::Images);
    }

    #[test]
    fn test_empty_form_reports_every_field() {
        let errors = EmergencyFormData::new().validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                FieldError::Required(FormField::LicensePlate),
                FieldError::Required(FormField::IdNumber),
                FieldError::MissingImage,
                FieldError::Required(FormField::Description),
            ]
        );
    }

    #[test]
    fn test_bad_formats() {
        let mut form = valid_form();
        form.set_text(FormField::LicensePlate, "AB 1234");
        form.set_text(FormField::IdNumber, "A2345678Z");
        form.set_text(FormField::Description, "  crash   ");
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                FieldError::InvalidFormat(FormField::LicensePlate),
                FieldError::InvalidFormat(FormField::IdNumber),
                FieldError::DescriptionTooShort,
            ]
        );
    }

    #[test]
    fn test_image_rules() {
        assert!(photo(MAX_IMAGE_BYTES).validate().is_ok());
        assert!(matches!(
            photo(MAX_IMAGE_BYTES + 1).validate(),
            Err(ImageRejection::TooLarge { .. })
        ));

        let mut pdf = photo(10);
        pdf.mime_type = "application/pdf".into();
        let mut form = EmergencyFormData::new();
        assert!(form.attach_image(pdf).is_err());
        assert!(form.images.is_empty());
        assert!(form.attach_image(photo(10)).is_ok());
        assert_eq!(form.remove_image(3), None);
        assert!(form.remove_image(0).is_some());
    }

    #[test]
    fn test_field_error_serialization() {
        let json = serde_json::to_string(&FieldError::Required(FormField::IdNumber)).unwrap();
        assert_eq!(json, r#"{"kind":"required","field":"id_number"}"#);
        let json = serde_json::to_string(&FieldError::MissingImage).unwrap();
        assert_eq!(json, r#"{"kind":"missing_image"}"#);
    }
}
