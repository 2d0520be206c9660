//! Password strength rules.
//!
//! Every minimum of 0 disables its check. The maximum length is always
//! enforced and is checked first, so oversized input is never scanned. Letters and capitals are
//! ASCII only; any Unicode numeric counts as a digit; everything else is a
//! non-alphanumeric.

use thiserror::Error;

use crate::config::PasswordRulesConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("The password must have at least {0} characters.")]
    TooShort(usize),

    #[error("The password must have at most {0} characters.")]
    TooLong(usize),

    #[error("The password must contain at least {0} letters.")]
    TooFewLetters(usize),

    #[error("The password must contain at least {0} capital letters.")]
    TooFewCapitals(usize),

    #[error("The password must contain at least {0} digits.")]
    TooFewDigits(usize),

    #[error("The password must contain at least {0} non alpha-numeric characters.")]
    TooFewNonAlphanumerics(usize),

    #[error("The password must not contain repetitive groups of characters.")]
    RepetitiveCharacters,

    #[error("The password must not contain the user name.")]
    ContainsUsername,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CharacterCounts {
    total: usize,
    letters: usize,
    capitals: usize,
    digits: usize,
    others: usize,
}

impl CharacterCounts {
    fn of(candidate: &str) -> Self {
        candidate.chars().fold(Self::default(), |mut acc, c| {
            acc.total += 1;
            if c.is_ascii_alphabetic() {
                acc.letters += 1;
                if c.is_ascii_uppercase() {
                    acc.capitals += 1;
                }
            } else if c.is_numeric() {
                acc.digits += 1;
            } else {
                acc.others += 1;
            }
            acc
        })
    }
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    min_characters: usize,
    max_characters: usize,
    min_letters: usize,
    min_capitals: usize,
    min_digits: usize,
    min_non_alpha_numerics: usize,
    allow_repetitive_characters: bool,
    can_contain_username: bool,
}

impl From<&PasswordRulesConfig> for PasswordPolicy {
    fn from(rules: &PasswordRulesConfig) -> Self {
        Self {
            min_characters: rules.min_characters,
            max_characters: rules.max_characters,
            min_letters: rules.min_letters,
            min_capitals: rules.min_capitals,
            min_digits: rules.min_digits,
            min_non_alpha_numerics: rules.min_non_alpha_numerics,
            allow_repetitive_characters: rules.allow_repetitive_characters,
            can_contain_username: rules.can_contain_username,
        }
    }
}

impl PasswordPolicy {
    /// First violated rule, in the order the rules are listed in the config.
    pub fn check(&self, username: &str, candidate: &str) -> Result<(), PolicyViolation> {
        if self.exceeds_max_length(candidate) {
            return Err(PolicyViolation::TooLong(self.max_characters));
        }

        let counts = CharacterCounts::of(candidate);

        if self.min_characters > 0 && counts.total < self.min_characters {
            return Err(PolicyViolation::TooShort(self.min_characters));
        }
        if self.min_letters > 0 && counts.letters < self.min_letters {
            return Err(PolicyViolation::TooFewLetters(self.min_letters));
        }
        if self.min_capitals > 0 && counts.capitals < self.min_capitals {
            return Err(PolicyViolation::TooFewCapitals(self.min_capitals));
        }
        if self.min_digits > 0 && counts.digits < self.min_digits {
            return Err(PolicyViolation::TooFewDigits(self.min_digits));
        }
        if self.min_non_alpha_numerics > 0 && counts.others < self.min_non_alpha_numerics {
            return Err(PolicyViolation::TooFewNonAlphanumerics(
                self.min_non_alpha_numerics,
            ));
        }
        if !self.allow_repetitive_characters && has_repetitive_group(candidate) {
            return Err(PolicyViolation::RepetitiveCharacters);
        }
        if !self.can_contain_username {
            let username = username.trim().to_lowercase();
            if !username.is_empty() && candidate.to_lowercase().contains(&username) {
                return Err(PolicyViolation::ContainsUsername);
            }
        }

        Ok(())
    }

    /// Looks at no more than `max_characters + 1` characters.
    #[must_use]
    pub fn exceeds_max_length(&self, candidate: &str) -> bool {
        candidate.len() > self.max_characters
            && candidate.chars().take(self.max_characters + 1).count() > self.max_characters
    }
}

/// `aaa`, or any group of two or more characters directly repeated (`abab`).
fn has_repetitive_group(candidate: &str) -> bool {
    let chars: Vec<char> = candidate.chars().collect();

    if chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2]) {
        return true;
    }

    let n = chars.len();
    (2..=n / 2).any(|len| {
        (0..=n - 2 * len)
            .any(|start| chars[start..start + len] == chars[start + len..start + 2 * len])
    })
}
