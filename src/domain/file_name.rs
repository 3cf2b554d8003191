#[derive(Debug, Clone)]
pub struct FileName(String);

const MAX_LENGTH: usize = 255;

impl FileName {
    pub fn parse(s: String) -> Result<FileName, String> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err("The name cannot be empty".to_string());
        }
        if trimmed.chars().count() > MAX_LENGTH {
            return Err(format!(
                "The name must be at most {} characters long",
                MAX_LENGTH
            ));
        }
        if trimmed.contains(&['/', '\\', '\0'][..]) {
            return Err(format!("{} contains a forbidden character", trimmed));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(format!("{} is not a valid name", trimmed));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
