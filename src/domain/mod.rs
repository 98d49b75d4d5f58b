pub mod admins;
pub mod contributions;
pub mod profiles;
pub mod words;
