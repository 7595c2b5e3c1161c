//! Third-party identity providers and login types

use std::fmt;

use crate::error::{IdentityError, IdentityResult};

/// Third-party identity provider, identified by an integer code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum App {
    /// WeChat mini-program
    Mini,
    /// WeChat official account
    Mp,
}

impl App {
    pub fn from_value(value: i32) -> IdentityResult<Self> {
        match value {
            1 => Ok(App::Mini),
            2 => Ok(App::Mp),
            other => Err(IdentityError::InvalidCredential(format!(
                "Unknown app id: {}",
                other
            ))),
        }
    }

    pub fn value(self) -> i32 {
        match self {
            App::Mini => 1,
            App::Mp => 2,
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            App::Mini => write!(f, "mini-program"),
            App::Mp => write!(f, "official-account"),
        }
    }
}

/// How the user is logging in when a mobile/username lookup is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginType {
    Password,
    /// Mobile verification code
    Sms,
}

impl LoginType {
    pub fn value(self) -> i32 {
        match self {
            LoginType::Password => 0,
            LoginType::Sms => 1,
        }
    }
}
