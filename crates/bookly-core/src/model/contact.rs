// ── Customer contact ──

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Contact fields collected at checkout.
///
/// Validation is local and syntactic only -- good enough to catch typos
/// before the payment hand-off, not an identity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl CustomerContact {
    /// Validate all fields, reporting the first failure.
    ///
    /// Rules: name needs at least two words; email must be RFC-shaped
    /// (`local@domain.tld`); phone needs at least ten digits.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.split_whitespace().count() < 2 {
            return Err(CoreError::validation(
                "name",
                "enter your full name (first and last)",
            ));
        }
        if !is_email_shaped(&self.email) {
            return Err(CoreError::validation("email", "enter a valid email address"));
        }
        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        if digits < 10 {
            return Err(CoreError::validation(
                "phone",
                "enter a phone number with at least 10 digits",
            ));
        }
        Ok(())
    }

    /// Whitespace-trimmed copy safe to forward to the backend.
    pub fn sanitized(&self) -> Self {
        Self {
            name: collapse_whitespace(&self.name),
            email: self.email.trim().to_owned(),
            phone: self.phone.trim().to_owned(),
        }
    }
}

/// Minimal RFC-shaped check: one `@`, non-empty local part, domain with a
/// dot that isn't leading or trailing.
fn is_email_shaped(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || email.contains(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> CustomerContact {
        CustomerContact {
            name: "Jamie Rivera".into(),
            email: "jamie@example.com".into(),
            phone: "+1 (555) 867-5309".into(),
        }
    }

    #[test]
    fn valid_contact_passes() {
        assert!(contact().validate().is_ok());
    }

    #[test]
    fn single_word_name_fails() {
        let mut c = contact();
        c.name = "Jamie".into();
        let err = c.validate().expect_err("should fail");
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "name"));
    }

    #[test]
    fn malformed_emails_fail() {
        for bad in ["jamie", "jamie@", "@example.com", "jamie@example", "ja mie@example.com"] {
            let mut c = contact();
            c.email = bad.into();
            assert!(c.validate().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn short_phone_fails() {
        let mut c = contact();
        c.phone = "555-1234".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn phone_counts_digits_across_punctuation() {
        let mut c = contact();
        c.phone = "(555) 867-5309 x1".into();
        assert!(c.validate().is_ok());
    }

    #[test]
    fn sanitized_collapses_whitespace() {
        let c = CustomerContact {
            name: "  Jamie   Rivera ".into(),
            email: " jamie@example.com ".into(),
            phone: " 5558675309 ".into(),
        };
        let s = c.sanitized();
        assert_eq!(s.name, "Jamie Rivera");
        assert_eq!(s.email, "jamie@example.com");
        assert_eq!(s.phone, "5558675309");
    }
}
