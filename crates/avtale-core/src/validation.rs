use crate::appointment::ClinicalOutcome;
use crate::error::ValidationError;

const MAX_NOTE_CHARS: usize = 1000;
const MAX_NAME_CHARS: usize = 128;

/// Validator for user-supplied booking and profile fields.
pub struct Validator;

impl Validator {
    /// Validate a free-text booking note.
    pub fn validate_note(note: &str) -> Result<(), ValidationError> {
        let len = note.chars().count();
        if len > MAX_NOTE_CHARS {
            return Err(ValidationError::NoteTooLong(len));
        }
        Ok(())
    }

    /// Validate a provider or requester display name.
    /// Must be non-blank and at most 128 characters.
    pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let len = name.chars().count();
        if len > MAX_NAME_CHARS {
            return Err(ValidationError::NameTooLong(len));
        }
        Ok(())
    }

    /// Validate the outcome recorded on completion.
    pub fn validate_outcome(outcome: &ClinicalOutcome) -> Result<(), ValidationError> {
        if outcome.diagnosis.trim().is_empty() {
            return Err(ValidationError::EmptyDiagnosis);
        }
        if let Some(notes) = &outcome.notes {
            Self::validate_note(notes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_note() {
        assert!(Validator::validate_note("").is_ok());
        assert!(Validator::validate_note("checkup").is_ok());
        assert!(Validator::validate_note(&"a".repeat(1000)).is_ok());
    }

    #[test]
    fn test_note_too_long() {
        assert_eq!(
            Validator::validate_note(&"a".repeat(1001)),
            Err(ValidationError::NoteTooLong(1001))
        );
    }

    #[test]
    fn test_note_counts_chars_not_bytes() {
        assert!(Validator::validate_note(&"ø".repeat(1000)).is_ok());
    }

    #[test]
    fn test_display_name() {
        assert!(Validator::validate_display_name("Dr. Berg").is_ok());
        assert_eq!(
            Validator::validate_display_name("   "),
            Err(ValidationError::EmptyName)
        );
        assert_eq!(
            Validator::validate_display_name(&"x".repeat(129)),
            Err(ValidationError::NameTooLong(129))
        );
    }

    #[test]
    fn test_outcome_requires_diagnosis() {
        let outcome = ClinicalOutcome {
            diagnosis: " ".to_string(),
            prescription: None,
            notes: None,
        };
        assert_eq!(
            Validator::validate_outcome(&outcome),
            Err(ValidationError::EmptyDiagnosis)
        );

        let outcome = ClinicalOutcome {
            diagnosis: "influenza".to_string(),
            prescription: Some("rest".to_string()),
            notes: None,
        };
        assert!(Validator::validate_outcome(&outcome).is_ok());
    }
}
