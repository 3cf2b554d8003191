mod email_subject;
mod file_name;
mod folder;
mod new_password;
mod pagination;
mod user_email;
mod user_name;

pub use email_subject::EmailSubject;
pub use file_name::FileName;
pub use folder::Folder;
pub use new_password::NewPassword;
pub use pagination::Pagination;
pub use user_email::UserEmail;
pub use user_name::UserName;

pub struct NewUser {
    pub email: UserEmail,
    pub name: UserName,
    pub password: NewPassword,
}
