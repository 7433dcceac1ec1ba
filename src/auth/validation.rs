use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MIN_PASSWORD_LEN: usize = 8;
const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=20;

fn email_regex() -> &'static Regex {
   static RE: OnceLock<Regex> = OnceLock::new();
   RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("invalid regex"))
}

fn username_regex() -> &'static Regex {
   static RE: OnceLock<Regex> = OnceLock::new();
   RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("invalid regex"))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
   email_regex().is_match(email)
}

fn check_email(email: &str) -> Result<()> {
   if email.is_empty() {
      return Err(Error::validation("Email is required"));
   }
   if !is_valid_email(email) {
      return Err(Error::validation("Invalid email format"));
   }
   Ok(())
}

fn check_password_length(password: &str) -> Result<()> {
   if password.is_empty() {
      return Err(Error::validation("Password is required"));
   }
   if password.chars().count() < MIN_PASSWORD_LEN {
      return Err(Error::validation("Password must be at least 8 characters"));
   }
   Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCredentials {
   pub email: String,
   pub password: String,
}

impl LoginCredentials {
   pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
      Self {
         email: email.into(),
         password: password.into(),
      }
   }

   pub fn validate(&self) -> Result<()> {
      check_email(&self.email)?;
      check_password_length(&self.password)
   }
}

/// Sign-up form. `confirm_password` is checked locally and never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCredentials {
   pub first_name: String,
   pub last_name: String,
   pub email: String,
   pub password: String,
   #[serde(skip_serializing, default)]
   pub confirm_password: String,
   pub username: String,
}

impl RegisterCredentials {
   /// Checks fields in form order and reports the first failure.
   pub fn validate(&self) -> Result<()> {
      if self.first_name.trim().is_empty() {
         return Err(Error::validation("First name is required"));
      }
      if self.last_name.trim().is_empty() {
         return Err(Error::validation("Last name is required"));
      }
      check_email(&self.email)?;

      check_password_length(&self.password)?;
      if !self.password.chars().any(|c| c.is_ascii_uppercase()) {
         return Err(Error::validation("Must contain at least one uppercase letter"));
      }
      if !self.password.chars().any(|c| c.is_ascii_lowercase()) {
         return Err(Error::validation("Must contain at least one lowercase letter"));
      }
      if !self.password.chars().any(|c| c.is_ascii_digit()) {
         return Err(Error::validation("Must contain at least one number"));
      }

      if self.username.is_empty() {
         return Err(Error::validation("Username is required"));
      }
      let len = self.username.chars().count();
      if len < *USERNAME_LEN.start() {
         return Err(Error::validation("Username must be at least 3 characters"));
      }
      if len > *USERNAME_LEN.end() {
         return Err(Error::validation("Username must be at most 20 characters"));
      }
      if !username_regex().is_match(&self.username) {
         return Err(Error::validation(
            "Only letters, numbers, and underscores allowed",
         ));
      }

      if self.confirm_password.is_empty() {
         return Err(Error::validation("Please confirm your password"));
      }
      if self.confirm_password != self.password {
         return Err(Error::validation("Passwords do not match"));
      }
      Ok(())
   }
}
