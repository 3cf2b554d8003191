use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone)]
pub struct UserName(String);

const MAX_LENGTH: usize = 256;
const FORBIDDEN_CHARACTERS: [char; 9] = ['/', '(', ')', '"', '<', '>', '\\', '{', '}'];

impl UserName {
    pub fn parse(s: String) -> Result<UserName, String> {
        let trimmed = s.trim();

        let is_empty = trimmed.is_empty();
        let is_too_long = trimmed.graphemes(true).count() > MAX_LENGTH;
        let contains_forbidden_characters = trimmed
            .chars()
            .any(|c| FORBIDDEN_CHARACTERS.contains(&c));

        if is_empty || is_too_long || contains_forbidden_characters {
            Err(format!("{} is not a valid user name", s))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }
}

impl AsRef<str> for UserName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
