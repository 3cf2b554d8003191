use secrecy::{ExposeSecret, Secret};

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 128;

/// A password chosen by a user, checked for length before it gets hashed.
#[derive(Debug)]
pub struct NewPassword(Secret<String>);

impl NewPassword {
    pub fn parse(s: Secret<String>) -> Result<NewPassword, String> {
        let length = s.expose_secret().chars().count();
        if length < MIN_LENGTH {
            Err(format!(
                "The password must be at least {} characters long",
                MIN_LENGTH
            ))
        } else if length > MAX_LENGTH {
            Err(format!(
                "The password must be at most {} characters long",
                MAX_LENGTH
            ))
        } else {
            Ok(Self(s))
        }
    }

    pub fn into_secret(self) -> Secret<String> {
        self.0
    }
}
