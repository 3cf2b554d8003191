#[derive(Debug, Clone)]
pub struct EmailSubject(String);

const MAX_LENGTH: usize = 500;

impl EmailSubject {
    pub fn parse(s: String) -> Result<EmailSubject, String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err("The subject cannot be empty".to_string())
        } else if trimmed.chars().count() > MAX_LENGTH {
            Err(format!(
                "The subject must be at most {} characters long",
                MAX_LENGTH
            ))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }
}

impl AsRef<str> for EmailSubject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
