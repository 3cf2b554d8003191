mod change_password;
mod cloud_folders;
mod files;
mod health_check;
mod helpers;
mod login;
mod register;
