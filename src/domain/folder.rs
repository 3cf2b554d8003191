use std::fmt;

/// Where an email lives for its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Archive,
    Trash,
    Spam,
    Custom(String),
}

const MAX_CUSTOM_LENGTH: usize = 100;

impl Folder {
    pub const SYSTEM: [Folder; 6] = [
        Folder::Inbox,
        Folder::Sent,
        Folder::Drafts,
        Folder::Archive,
        Folder::Trash,
        Folder::Spam,
    ];

    /// Parses either a system folder or a custom folder name.
    pub fn parse(s: &str) -> Result<Folder, String> {
        let trimmed = s.trim();
        if let Some(folder) = Self::system(trimmed) {
            return Ok(folder);
        }

        if trimmed.is_empty() {
            return Err("The folder name cannot be empty".to_string());
        }
        if trimmed.chars().count() > MAX_CUSTOM_LENGTH {
            return Err(format!(
                "The folder name must be at most {} characters long",
                MAX_CUSTOM_LENGTH
            ));
        }
        if trimmed.chars().any(|c| c == '/' || c.is_control()) {
            return Err(format!("{} is not a valid folder name", trimmed));
        }

        Ok(Folder::Custom(trimmed.to_string()))
    }

    fn system(s: &str) -> Option<Folder> {
        let folder = match s.to_lowercase().as_str() {
            "inbox" => Folder::Inbox,
            "sent" => Folder::Sent,
            "drafts" => Folder::Drafts,
            "archive" => Folder::Archive,
            "trash" => Folder::Trash,
            "spam" => Folder::Spam,
            _ => return None,
        };
        Some(folder)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Folder::Inbox => "inbox",
            Folder::Sent => "sent",
            Folder::Drafts => "drafts",
            Folder::Archive => "archive",
            Folder::Trash => "trash",
            Folder::Spam => "spam",
            Folder::Custom(name) => name,
        }
    }

    pub fn is_system(&self) -> bool {
        !matches!(self, Folder::Custom(_))
    }
}

impl Default for Folder {
    fn default() -> Self {
        Folder::Inbox
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
